//! Application configuration for the winfault agent.
//!
//! Resolution order for the ports is CLI flag, then the
//! `STEADYBIT_EXTENSION_PORT` / `STEADYBIT_EXTENSION_HEALTH_PORT`
//! environment variables, then the built-in defaults. Both ports feed the
//! auto-appended excludes of every attack.

use anyhow::Result;
use std::env;
use tracing_subscriber::EnvFilter;

use super::cli::CliConfig;

pub const PORT_ENV: &str = "STEADYBIT_EXTENSION_PORT";
pub const HEALTH_PORT_ENV: &str = "STEADYBIT_EXTENSION_HEALTH_PORT";

const DEFAULT_PORT: u16 = 8085;
const DEFAULT_HEALTH_PORT: u16 = 8081;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

/// Log level enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub health_port: u16,
    pub reaper_interval_secs: u64,
    pub log_level: LogLevel,
}

impl AppConfig {
    /// Create application configuration from CLI config and environment
    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        let log_level = if cli_config.verbose {
            LogLevel::Debug
        } else {
            match env::var("RUST_LOG") {
                Ok(level_str) => Self::parse_log_level(&level_str),
                Err(_) => LogLevel::Info,
            }
        };

        Ok(Self {
            port: resolve_port(cli_config.port, PORT_ENV, DEFAULT_PORT)?,
            health_port: resolve_port(cli_config.health_port, HEALTH_PORT_ENV, DEFAULT_HEALTH_PORT)?,
            reaper_interval_secs: cli_config
                .reaper_interval_secs
                .unwrap_or(DEFAULT_REAPER_INTERVAL_SECS),
            log_level,
        })
    }

    /// Parse log level from string
    fn parse_log_level(level_str: &str) -> LogLevel {
        let main_level = level_str
            .split(',')
            .next()
            .unwrap_or(level_str)
            .split('=')
            .next()
            .unwrap_or(level_str)
            .to_lowercase();

        match main_level.as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        let log_filter = match env::var("RUST_LOG") {
            Ok(existing) if !existing.is_empty() && !matches!(self.log_level, LogLevel::Debug) => {
                existing
            }
            _ => self.log_level.to_filter_string().to_string(),
        };

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&log_filter))
            .with_target(false)
            .compact()
            .init();

        tracing::info!("Logging initialized with level: {:?}", self.log_level);
        Ok(())
    }

    /// Validate application configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == self.health_port {
            return Err(anyhow::anyhow!(
                "port and health port must differ, both are {}",
                self.port
            ));
        }
        if self.reaper_interval_secs == 0 {
            return Err(anyhow::anyhow!("reaper interval must be greater than 0"));
        }
        Ok(())
    }

    /// The ports protected on all owned addresses.
    pub fn own_ports(&self) -> Vec<u16> {
        vec![self.port, self.health_port]
    }
}

fn resolve_port(cli_value: Option<u16>, env_name: &str, default: u16) -> Result<u16> {
    if let Some(port) = cli_value {
        return Ok(port);
    }
    match env::var(env_name) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("invalid {env_name} value '{raw}'")),
        Err(_) => Ok(default),
    }
}
