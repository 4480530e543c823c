use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use winfault_shared::{FaultError, Filter};

use super::{
    engine_teardown_commands, stage_filter_file, validate_duration, validate_percentage, Mode,
};

/// Drops a uniformly random percentage of matching packets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketLossOpts {
    pub filter: Filter,
    pub loss_percent: u32,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_file: Option<PathBuf>,
}

impl PacketLossOpts {
    pub fn new(filter: Filter, loss_percent: u32, duration: Duration) -> Result<Self, FaultError> {
        validate_duration(duration)?;
        validate_percentage(loss_percent)?;
        Ok(Self {
            filter,
            loss_percent,
            duration,
            filter_file: None,
        })
    }

    pub(super) fn packet_commands(&mut self, mode: Mode) -> Result<Vec<String>, FaultError> {
        match mode {
            Mode::Add => {
                let path = stage_filter_file(&self.filter, &mut self.filter_file)?;
                Ok(vec![format!(
                    "wdna.exe --file=\"{}\" --mode=drop --duration={} --percentage={}",
                    path.display(),
                    self.duration.as_secs(),
                    self.loss_percent
                )])
            }
            Mode::Delete => Ok(engine_teardown_commands(&mut self.filter_file)),
        }
    }
}

impl fmt::Display for PacketLossOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("loosing packages of {}%", self.loss_percent);
        self.filter.write_fingerprint(&mut out);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winfault_shared::{NetWithPortRange, PortRange};

    fn filter() -> Filter {
        Filter {
            include: vec![NetWithPortRange::new(
                "1.1.1.0/24".parse().unwrap(),
                PortRange::ANY,
            )],
            ..Filter::default()
        }
    }

    #[test]
    fn add_command_carries_percentage() {
        let mut opts = PacketLossOpts::new(filter(), 30, Duration::from_secs(10)).unwrap();
        let cmds = opts.packet_commands(Mode::Add).unwrap();
        assert!(cmds[0].contains("--mode=drop"));
        assert!(cmds[0].contains("--percentage=30"));
        if let Some(path) = opts.filter_file.take() {
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn fingerprint_names_the_loss() {
        let opts = PacketLossOpts::new(filter(), 30, Duration::from_secs(10)).unwrap();
        assert!(opts.to_string().starts_with("loosing packages of 30%"));
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        assert!(PacketLossOpts::new(filter(), 0, Duration::from_secs(10)).is_err());
        assert!(PacketLossOpts::new(filter(), 101, Duration::from_secs(10)).is_err());
    }
}
