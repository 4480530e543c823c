use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::errors::FaultError;

/// Parses a literal IP address or CIDR block. Bare addresses become
/// single-host networks (/32 or /128). Returns `None` for anything else,
/// which callers treat as a hostname to resolve.
pub fn parse_ip_or_cidr(input: &str) -> Option<IpNet> {
    if let Ok(net) = IpNet::from_str(input) {
        return Some(net);
    }
    IpAddr::from_str(input).ok().map(host_net)
}

/// Like [`parse_ip_or_cidr`] but failing with `InvalidCidr` instead of
/// falling back to name resolution. Used for restricted endpoints, which are
/// always literal.
pub fn parse_cidr(input: &str) -> Result<IpNet, FaultError> {
    parse_ip_or_cidr(input).ok_or_else(|| FaultError::InvalidCidr(input.to_string()))
}

/// The single-host network for an address.
pub fn host_net(ip: IpAddr) -> IpNet {
    match ip {
        IpAddr::V4(v4) => IpNet::new(IpAddr::V4(v4), 32).expect("/32 is valid"),
        IpAddr::V6(v6) => IpNet::new(IpAddr::V6(v6), 128).expect("/128 is valid"),
    }
}

/// The "any destination" substitute for an empty include list: all of IPv4
/// and all of IPv6.
pub fn any_networks() -> Vec<IpNet> {
    vec![
        "0.0.0.0/0".parse().expect("valid v4 any net"),
        "::/0".parse().expect("valid v6 any net"),
    ]
}

/// First and last address of a network: the network address and the address
/// obtained by OR-ing in the inverted mask.
pub fn start_end_ip(net: &IpNet) -> (IpAddr, IpAddr) {
    (net.network(), net.broadcast())
}

/// Whether the network covers exactly one host.
pub fn is_single_host(net: &IpNet) -> bool {
    net.prefix_len() == net.max_prefix_len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_ip_as_host_net() {
        let net = parse_ip_or_cidr("1.1.1.14").unwrap();
        assert_eq!(net.to_string(), "1.1.1.14/32");
        assert!(is_single_host(&net));

        let net = parse_ip_or_cidr("2001:db8::1").unwrap();
        assert_eq!(net.prefix_len(), 128);
    }

    #[test]
    fn parses_cidr() {
        let net = parse_ip_or_cidr("10.0.0.0/24").unwrap();
        assert_eq!(net.prefix_len(), 24);
        assert!(!is_single_host(&net));
    }

    #[test]
    fn hostname_is_not_an_ip() {
        assert!(parse_ip_or_cidr("steadybit.example.com").is_none());
        assert!(parse_cidr("not-a-cidr").is_err());
    }

    #[test]
    fn start_end_of_v4_net() {
        let net: IpNet = "1.1.1.1/24".parse().unwrap();
        let (start, end) = start_end_ip(&net);
        assert_eq!(start.to_string(), "1.1.1.0");
        assert_eq!(end.to_string(), "1.1.1.255");
    }

    #[test]
    fn start_end_of_uneven_prefix() {
        let net: IpNet = "1.1.3.120/22".parse().unwrap();
        let (start, end) = start_end_ip(&net);
        assert_eq!(start.to_string(), "1.1.0.0");
        assert_eq!(end.to_string(), "1.1.3.255");
    }

    #[test]
    fn start_end_of_v6_any() {
        let net: IpNet = "::/0".parse().unwrap();
        let (start, end) = start_end_ip(&net);
        assert_eq!(start.to_string(), "::");
        assert_eq!(
            end.to_string(),
            "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"
        );
    }

    #[test]
    fn any_networks_cover_both_families() {
        let nets = any_networks();
        assert_eq!(nets.len(), 2);
        assert!(nets[0].contains(&"203.0.113.9".parse::<IpAddr>().unwrap()));
        assert!(nets[1].contains(&"2001:db8::9".parse::<IpAddr>().unwrap()));
    }
}
