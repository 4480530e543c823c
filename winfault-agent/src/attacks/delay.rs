use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use winfault_shared::{FaultError, Filter};

use super::{engine_teardown_commands, stage_filter_file, validate_duration, Mode};

/// Delays each matching packet, with optional ±30% jitter applied by the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayOpts {
    pub filter: Filter,
    pub delay: Duration,
    pub jitter: bool,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_file: Option<PathBuf>,
}

impl DelayOpts {
    pub fn new(
        filter: Filter,
        delay: Duration,
        jitter: bool,
        duration: Duration,
    ) -> Result<Self, FaultError> {
        validate_duration(duration)?;
        Ok(Self {
            filter,
            delay,
            jitter,
            duration,
            filter_file: None,
        })
    }

    pub(super) fn packet_commands(&mut self, mode: Mode) -> Result<Vec<String>, FaultError> {
        match mode {
            Mode::Add => {
                let path = stage_filter_file(&self.filter, &mut self.filter_file)?;
                let mut cmd = format!(
                    "wdna.exe --file=\"{}\" --mode=delay --duration={} --time={}",
                    path.display(),
                    self.duration.as_secs(),
                    self.delay.as_millis()
                );
                if self.jitter {
                    cmd.push_str(" --jitter");
                }
                Ok(vec![cmd])
            }
            Mode::Delete => Ok(engine_teardown_commands(&mut self.filter_file)),
        }
    }
}

impl fmt::Display for DelayOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!(
            "delay by {}ms (jitter: {})",
            self.delay.as_millis(),
            if self.jitter { "yes" } else { "no" }
        );
        self.filter.write_fingerprint(&mut out);
        f.write_str(&out)
    }
}
