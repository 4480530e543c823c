//! Name resolution for selector inputs.
//!
//! Request `ip` and `hostname` fields arrive as one mixed list of IPs,
//! CIDRs, and hostnames. Literals are parsed directly; the rest go through
//! the system resolver for both A and AAAA records. A hostname that yields
//! no records fails the entire request, names are never trimmed.

use std::net::IpAddr;

use tracing::trace;

use ipnet::IpNet;
use winfault_shared::{host_net, parse_ip_or_cidr, FaultError};

/// Maps a mixed list of IPs, CIDRs, and hostnames to networks: literals in
/// input order first, then the resolutions of the remaining names.
pub async fn map_to_networks(inputs: &[String]) -> Result<Vec<IpNet>, FaultError> {
    let mut nets = Vec::with_capacity(inputs.len());
    let mut hostnames = Vec::new();

    for input in inputs {
        match parse_ip_or_cidr(input) {
            Some(net) => nets.push(net),
            None => hostnames.push(input.as_str()),
        }
    }

    let resolved = resolve_hostnames(&hostnames).await?;
    nets.extend(resolved.into_iter().map(host_net));
    Ok(nets)
}

/// Resolves hostnames through the system resolver. Empty or whitespace-only
/// names are invalid; a resolvable name must yield at least one address.
pub async fn resolve_hostnames(hostnames: &[&str]) -> Result<Vec<IpAddr>, FaultError> {
    if hostnames.is_empty() {
        return Ok(Vec::new());
    }

    let invalid: Vec<&str> = hostnames
        .iter()
        .copied()
        .filter(|name| name.trim().is_empty())
        .collect();
    if !invalid.is_empty() {
        return Err(FaultError::InvalidHostname(invalid.join("', '")));
    }

    let mut resolved = Vec::new();
    for hostname in hostnames {
        let addrs: Vec<IpAddr> = match tokio::net::lookup_host((*hostname, 0u16)).await {
            Ok(addrs) => addrs.map(|sa| sa.ip()).collect(),
            Err(_) => Vec::new(),
        };
        if addrs.is_empty() {
            return Err(FaultError::UnresolvableHostname(hostname.to_string()));
        }
        resolved.extend(addrs);
    }

    trace!(?hostnames, ?resolved, "resolved hostnames");
    Ok(resolved)
}

/// Parses a list of port or port-range expressions, skipping empty entries.
pub fn parse_port_ranges(
    raw: &[String],
) -> Result<Vec<winfault_shared::PortRange>, FaultError> {
    let mut ranges = Vec::new();
    for entry in raw {
        if entry.is_empty() {
            continue;
        }
        ranges.push(entry.parse()?);
    }
    Ok(ranges)
}
