use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::ports::PortRange;

/// The atomic unit of the selector algebra: one network plus one port range.
/// The optional comment is carried for diagnostics only and never compiled
/// into filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetWithPortRange {
    pub net: IpNet,
    pub ports: PortRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl NetWithPortRange {
    pub fn new(net: IpNet, ports: PortRange) -> Self {
        Self {
            net,
            ports,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        if !comment.is_empty() {
            self.comment = Some(comment);
        }
        self
    }

    /// Cartesian product of networks and port ranges, network-major.
    pub fn cartesian(nets: &[IpNet], ranges: &[PortRange]) -> Vec<Self> {
        let mut out = Vec::with_capacity(nets.len() * ranges.len());
        for net in nets {
            for ports in ranges {
                out.push(Self::new(*net, *ports));
            }
        }
        out
    }

    /// Two entries overlap iff their networks overlap and their port ranges
    /// overlap. Networks of different families never overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        let nets_overlap = self.net.contains(&other.net) || other.net.contains(&self.net);
        nets_overlap && self.ports.overlaps(&other.ports)
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.net.contains(&other.net) && self.ports.contains(&other.ports)
    }

    /// Lossy merge into the smallest common supernet. Only entries of the
    /// same family with identical port ranges merge; the result contains
    /// both inputs and possibly more (the caller accepts the broadening).
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if self.ports != other.ports {
            return None;
        }
        let prefix = match (self.net.network(), other.net.network()) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let common = (u32::from(a) ^ u32::from(b)).leading_zeros() as u8;
                common.min(self.net.prefix_len()).min(other.net.prefix_len())
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let common = (u128::from(a) ^ u128::from(b)).leading_zeros() as u8;
                common.min(self.net.prefix_len()).min(other.net.prefix_len())
            }
            _ => return None,
        };
        let merged = IpNet::new(self.net.network(), prefix)
            .expect("prefix is within the family maximum")
            .trunc();
        Some(Self::new(merged, self.ports))
    }

    /// Total order by family, network address, prefix length, then ports.
    /// Comments do not participate.
    pub fn compare(&self, other: &Self) -> Ordering {
        fn family_rank(net: &IpNet) -> u8 {
            match net {
                IpNet::V4(_) => 4,
                IpNet::V6(_) => 6,
            }
        }
        family_rank(&self.net)
            .cmp(&family_rank(&other.net))
            .then_with(|| self.net.network().cmp(&other.net.network()))
            .then_with(|| self.net.prefix_len().cmp(&other.net.prefix_len()))
            .then_with(|| self.ports.from.cmp(&other.ports.from))
            .then_with(|| self.ports.to.cmp(&other.ports.to))
    }

    /// Prefix length of the network, used to prefer the most specific merge
    /// candidates during condensation.
    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }
}

impl fmt::Display for NetWithPortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ports.is_any() {
            write!(f, "{}", self.net)
        } else {
            write!(f, "{}:{}", self.net, self.ports)
        }
    }
}
