use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use winfault_shared::{FaultError, Filter};

use super::{engine_teardown_commands, stage_filter_file, validate_duration, Mode};

/// Drops 100% of matching traffic in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackholeOpts {
    pub filter: Filter,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_file: Option<PathBuf>,
}

impl BlackholeOpts {
    pub fn new(filter: Filter, duration: Duration) -> Result<Self, FaultError> {
        validate_duration(duration)?;
        Ok(Self {
            filter,
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

impl fmt::Display for BlackholeOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from("blocking traffic ");
        self.filter.write_fingerprint(&mut out);
        f.write_str(&out)
    }
}
