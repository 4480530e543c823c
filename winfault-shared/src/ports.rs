use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FaultError;

/// An inclusive port range. `[0, 0]` is the canonical "any port" value:
/// the selector compiler widens it to the full 0..=65535 span and renderers
/// omit it entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    /// Matches any port.
    pub const ANY: PortRange = PortRange { from: 0, to: 0 };

    pub fn new(from: u16, to: u16) -> Result<Self, FaultError> {
        if from > to {
            return Err(FaultError::InvalidPortRange(format!("{from}-{to}")));
        }
        Ok(Self { from, to })
    }

    pub fn single(port: u16) -> Self {
        Self {
            from: port,
            to: port,
        }
    }

    pub fn is_any(&self) -> bool {
        self.from == 0 && self.to == 0
    }

    pub fn is_single(&self) -> bool {
        !self.is_any() && self.from == self.to
    }

    /// Effective inclusive bounds, widening "any" to the full span.
    pub fn bounds(&self) -> (u16, u16) {
        if self.is_any() {
            (0, u16::MAX)
        } else {
            (self.from, self.to)
        }
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        let (af, at) = self.bounds();
        let (bf, bt) = other.bounds();
        af <= bt && bf <= at
    }

    pub fn contains(&self, other: &PortRange) -> bool {
        let (af, at) = self.bounds();
        let (bf, bt) = other.bounds();
        af <= bf && bt <= at
    }
}

impl FromStr for PortRange {
    type Err = FaultError;

    /// Parses `N` into `[N, N]` and `N-M` into `[N, M]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FaultError::InvalidPortRange(s.to_string());
        match s.split_once('-') {
            Some((from, to)) => {
                let from = from.trim().parse::<u16>().map_err(|_| invalid())?;
                let to = to.trim().parse::<u16>().map_err(|_| invalid())?;
                PortRange::new(from, to)
            }
            None => {
                let port = s.trim().parse::<u16>().map_err(|_| invalid())?;
                Ok(PortRange::single(port))
            }
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            write!(f, "any")
        } else if self.is_single() {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_port() {
        let range: PortRange = "8080".parse().unwrap();
        assert_eq!(range, PortRange::single(8080));
        assert!(range.is_single());
    }

    #[test]
    fn parses_range() {
        let range: PortRange = "8000-9000".parse().unwrap();
        assert_eq!(range.from, 8000);
        assert_eq!(range.to, 9000);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!("9000-8000".parse::<PortRange>().is_err());
        assert!("foo".parse::<PortRange>().is_err());
        assert!("".parse::<PortRange>().is_err());
    }

    #[test]
    fn any_overlaps_and_contains_everything() {
        let any = PortRange::ANY;
        let some = PortRange::new(100, 200).unwrap();
        assert!(any.overlaps(&some));
        assert!(any.contains(&some));
        assert!(!some.contains(&any));
        assert!(some.overlaps(&any));
    }

    #[test]
    fn overlap_is_inclusive() {
        let a = PortRange::new(100, 200).unwrap();
        let b = PortRange::new(200, 300).unwrap();
        let c = PortRange::new(201, 300).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn display_forms() {
        assert_eq!(PortRange::single(53).to_string(), "53");
        assert_eq!(PortRange::new(80, 443).unwrap().to_string(), "80-443");
        assert_eq!(PortRange::ANY.to_string(), "any");
    }
}
