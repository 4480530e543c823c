use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use winfault_shared::{FaultError, Filter, PortRange};

use super::{engine_teardown_commands, stage_filter_file, validate_duration, Mode};

/// Blocks DNS by dropping all matching traffic on the DNS port, in both
/// directions. A blackhole narrowed to one port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDnsOpts {
    pub filter: Filter,
    pub dns_port: u16,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_file: Option<PathBuf>,
}

impl BlockDnsOpts {
    /// Narrows every include entry to the DNS port before storing the
    /// filter.
    pub fn new(mut filter: Filter, dns_port: u16, duration: Duration) -> Result<Self, FaultError> {
        validate_duration(duration)?;
        for include in &mut filter.include {
            include.ports = PortRange::single(dns_port);
        }
        Ok(Self {
            filter,
            dns_port,
            duration,
            filter_file: None,
        })
    }

    pub(super) fn packet_commands(&mut self, mode: Mode) -> Result<Vec<String>, FaultError> {
        match mode {
            Mode::Add => {
                let path = stage_filter_file(&self.filter, &mut self.filter_file)?;
                Ok(vec![
                    "ipconfig /flushdns".to_string(),
                    format!(
                        "wdna.exe --file=\"{}\" --mode=drop --percentage=100 --duration={}",
                        path.display(),
                        self.duration.as_secs()
                    ),
                ])
            }
            Mode::Delete => Ok(engine_teardown_commands(&mut self.filter_file)),
        }
    }
}

impl fmt::Display for BlockDnsOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("blocking DNS traffic on port {} ", self.dns_port);
        self.filter.write_fingerprint(&mut out);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winfault_shared::{Direction, NetWithPortRange};

    fn filter() -> Filter {
        Filter {
            include: vec![NetWithPortRange::new(
                "0.0.0.0/0".parse().unwrap(),
                PortRange::ANY,
            )],
            direction: Direction::Both,
            ..Filter::default()
        }
    }

    #[test]
    fn includes_are_narrowed_to_the_dns_port() {
        let opts = BlockDnsOpts::new(filter(), 53, Duration::from_secs(30)).unwrap();
        assert!(opts
            .filter
            .include
            .iter()
            .all(|inc| inc.ports == PortRange::single(53)));
    }

    #[test]
    fn compiled_filter_matches_only_the_dns_port() {
        let mut opts = BlockDnsOpts::new(filter(), 53, Duration::from_secs(30)).unwrap();
        let cmds = opts.packet_commands(Mode::Add).unwrap();
        assert_eq!(cmds[0], "ipconfig /flushdns");
        assert!(cmds[1].contains("--mode=drop"));
        assert!(cmds[1].contains("--percentage=100"));

        let content =
            std::fs::read_to_string(opts.filter_file.as_ref().unwrap()).unwrap();
        assert!(content.contains("tcp.DstPort == 53"));
        assert!(content.contains("udp.SrcPort == 53"));
        if let Some(path) = opts.filter_file.take() {
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn custom_dns_port_shows_in_fingerprint() {
        let opts = BlockDnsOpts::new(filter(), 5353, Duration::from_secs(30)).unwrap();
        assert!(opts.to_string().starts_with("blocking DNS traffic on port 5353 "));
    }
}
