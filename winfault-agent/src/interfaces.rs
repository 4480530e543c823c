//! Network interface lookups and the agent's own-endpoint excludes.
//!
//! Interface names from requests are resolved to kernel interface indexes at
//! filter-compile time; if interfaces change during an attack the compiled
//! filter is stale. Own-IP discovery feeds the auto-appended excludes that
//! keep the agent's control plane reachable during an attack.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::IpNet;
use tracing::warn;

use winfault_shared::{host_net, FaultError, NetWithPortRange, PortRange};

use crate::runner::{CommandRunner, Shell};

/// Resolves interface names to kernel interface indexes. Unknown names fail
/// the request: a selector silently scoped to nothing would be worse.
pub async fn resolve_interface_indexes<R: CommandRunner>(
    runner: &R,
    names: &[String],
) -> Result<Vec<u32>, FaultError> {
    let mut indexes = Vec::with_capacity(names.len());
    for name in names {
        let command = format!(
            "(Get-NetAdapter -Name '{}').ifIndex",
            name.replace('\'', "''")
        );
        let output = runner.run(&[command], Shell::Invoke).await?;
        let index = output
            .trim()
            .lines()
            .next()
            .and_then(|line| line.trim().parse::<u32>().ok())
            .ok_or_else(|| FaultError::FilterCompileFailed {
                message: format!("unknown network interface '{name}'"),
            })?;
        indexes.push(index);
    }
    Ok(indexes)
}

/// All addresses assigned to this host, as single-host networks. Loopback is
/// always included even when discovery fails, the agent must never cut off
/// its own control plane.
pub async fn discover_own_networks<R: CommandRunner>(runner: &R) -> Vec<IpNet> {
    let mut nets = vec![
        host_net(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        host_net(IpAddr::V6(Ipv6Addr::LOCALHOST)),
    ];

    match runner
        .run(
            &["(Get-NetIPAddress).IPAddress".to_string()],
            Shell::Invoke,
        )
        .await
    {
        Ok(output) => {
            for line in output.lines() {
                // Link-local v6 entries come with a zone suffix.
                let trimmed = line.trim().split('%').next().unwrap_or("");
                if let Ok(ip) = IpAddr::from_str(trimmed) {
                    let net = host_net(ip);
                    if !nets.contains(&net) {
                        nets.push(net);
                    }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to discover own addresses, excluding loopback only");
        }
    }

    nets
}

/// The excludes protecting the agent itself: every owned address crossed
/// with every owned port.
pub fn own_endpoint_excludes(own_nets: &[IpNet], own_ports: &[u16]) -> Vec<NetWithPortRange> {
    let mut excludes = Vec::with_capacity(own_nets.len() * own_ports.len());
    for net in own_nets {
        for port in own_ports {
            excludes.push(
                NetWithPortRange::new(*net, PortRange::single(*port)).with_comment("own endpoint"),
            );
        }
    }
    excludes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_excludes_cross_every_net_with_every_port() {
        let nets = vec![
            "127.0.0.1/32".parse().unwrap(),
            "192.168.1.10/32".parse().unwrap(),
        ];
        let excludes = own_endpoint_excludes(&nets, &[8085, 8081]);
        assert_eq!(excludes.len(), 4);
        assert!(excludes
            .iter()
            .any(|e| e.net.to_string() == "127.0.0.1/32" && e.ports == PortRange::single(8085)));
        assert!(excludes
            .iter()
            .any(|e| e.net.to_string() == "192.168.1.10/32" && e.ports == PortRange::single(8081)));
        assert!(excludes.iter().all(|e| e.comment.is_some()));
    }

    #[test]
    fn no_ports_means_no_excludes() {
        let nets = vec!["127.0.0.1/32".parse().unwrap()];
        assert!(own_endpoint_excludes(&nets, &[]).is_empty());
    }
}
