use std::fmt;

use serde::{Deserialize, Serialize};

use crate::npr::NetWithPortRange;

/// Traffic direction a selector applies to. The WinDivert expression carries
/// `outbound`, `inbound`, or no direction token for [`Direction::Both`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outgoing => write!(f, "outgoing"),
            Direction::Incoming => write!(f, "incoming"),
            Direction::Both => write!(f, "both"),
        }
    }
}

/// A compiled-to-be selector: what to affect, what to spare, where.
///
/// An empty include list means "any destination"; callers substitute the
/// any-networks before compilation. The exclude list is non-empty in
/// practice, the agent always appends its own endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub include: Vec<NetWithPortRange>,
    pub exclude: Vec<NetWithPortRange>,
    pub interface_indexes: Vec<u32>,
    pub direction: Direction,
}

impl Filter {
    /// Renders the selector portion of an attack fingerprint:
    ///
    /// ```text
    /// to/from:
    ///  <cidr>[:<ports>]
    /// but not from/to:
    ///  <cidr>[:<ports>]
    /// on interfaces:
    ///  <idx>
    /// ```
    pub fn write_fingerprint(&self, out: &mut String) {
        out.push_str("\nto/from:\n");
        for inc in &self.include {
            out.push(' ');
            out.push_str(&inc.to_string());
            out.push('\n');
        }
        if !self.exclude.is_empty() {
            out.push_str("but not from/to:\n");
            for exc in &self.exclude {
                out.push(' ');
                out.push_str(&exc.to_string());
                out.push('\n');
            }
        }
        if !self.interface_indexes.is_empty() {
            out.push_str("on interfaces:\n");
            for idx in &self.interface_indexes {
                out.push(' ');
                out.push_str(&idx.to_string());
                out.push('\n');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortRange;

    #[test]
    fn default_direction_is_outgoing() {
        assert_eq!(Filter::default().direction, Direction::Outgoing);
    }

    #[test]
    fn fingerprint_lists_all_sections() {
        let filter = Filter {
            include: vec![NetWithPortRange::new(
                "1.1.1.0/24".parse().unwrap(),
                PortRange::new(8000, 8002).unwrap(),
            )],
            exclude: vec![NetWithPortRange::new(
                "127.0.0.1/32".parse().unwrap(),
                PortRange::single(8085),
            )],
            interface_indexes: vec![3, 7],
            direction: Direction::Outgoing,
        };
        let mut out = String::new();
        filter.write_fingerprint(&mut out);
        assert_eq!(
            out,
            "\nto/from:\n 1.1.1.0/24:8000-8002\nbut not from/to:\n 127.0.0.1/32:8085\non interfaces:\n 3\n 7\n"
        );
    }

    #[test]
    fn fingerprint_skips_empty_sections() {
        let filter = Filter {
            include: vec![NetWithPortRange::new(
                "1.1.1.1/32".parse().unwrap(),
                PortRange::ANY,
            )],
            ..Filter::default()
        };
        let mut out = String::new();
        filter.write_fingerprint(&mut out);
        assert_eq!(out, "\nto/from:\n 1.1.1.1/32\n");
    }

    #[test]
    fn direction_serde_round_trip() {
        let json = serde_json::to_string(&Direction::Both).unwrap();
        assert_eq!(json, "\"both\"");
        let back: Direction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Direction::Both);
    }
}
