//! CLI argument parsing for the winfault agent.
//!
//! This module handles command line argument parsing using clap and provides
//! a structured representation of CLI configuration consumed by the
//! application config.

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

/// CLI configuration structure containing all parsed command line arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub verbose: bool,
    pub port: Option<u16>,
    pub health_port: Option<u16>,
    pub reaper_interval_secs: Option<u64>,
}

impl CliConfig {
    /// Parse CLI arguments and create CliConfig
    pub fn from_args() -> Result<Self> {
        let matches = Self::build_cli().get_matches();
        Self::from_matches(&matches)
    }

    /// Create CliConfig from pre-parsed ArgMatches (useful for testing)
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            verbose: matches.get_flag("verbose"),
            port: matches.get_one::<u16>("port").copied(),
            health_port: matches.get_one::<u16>("health-port").copied(),
            reaper_interval_secs: matches.get_one::<u64>("reaper-interval").copied(),
        })
    }

    /// Build the clap Command structure
    pub fn build_cli() -> Command {
        Command::new("winfault-agent")
            .version(env!("CARGO_PKG_VERSION"))
            .about("winfault agent - host-level network fault injection for Windows")
            .long_about(
                "A host agent that applies bounded network faults (delay, bandwidth caps, \
                 blackholes, DNS blocks, packet loss and corruption) on the machine it runs on, \
                 driven by an orchestrator through a loopback HTTP API.",
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(clap::ArgAction::SetTrue)
                    .help("Enable verbose logging")
                    .long_help(
                        "Enable verbose debug logging. This will show detailed information \
                         about command execution, filter compilation, and service polling.",
                    ),
            )
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .value_parser(clap::value_parser!(u16))
                    .help("Loopback port for the action API")
                    .long_help(
                        "Loopback port the action API binds to. Falls back to the \
                         STEADYBIT_EXTENSION_PORT environment variable, then to 8085.",
                    )
                    .required(false),
            )
            .arg(
                Arg::new("health-port")
                    .long("health-port")
                    .value_name("PORT")
                    .value_parser(clap::value_parser!(u16))
                    .help("Port of the health endpoint, protected by the auto-excludes")
                    .long_help(
                        "Port of the health endpoint. Falls back to the \
                         STEADYBIT_EXTENSION_HEALTH_PORT environment variable, then to 8081. \
                         Both ports are appended to every attack's exclude list so the agent \
                         never cuts off its own control plane.",
                    )
                    .required(false),
            )
            .arg(
                Arg::new("reaper-interval")
                    .long("reaper-interval")
                    .value_name("SECONDS")
                    .value_parser(clap::value_parser!(u64))
                    .help("Seconds between residual QoS policy sweeps")
                    .required(false),
            )
    }

    /// Validate CLI configuration
    pub fn validate(&self) -> Result<()> {
        if let (Some(port), Some(health_port)) = (self.port, self.health_port) {
            if port == health_port {
                return Err(anyhow::anyhow!(
                    "port and health-port must differ, both are {port}"
                ));
            }
        }
        if self.reaper_interval_secs == Some(0) {
            return Err(anyhow::anyhow!("reaper-interval must be greater than 0"));
        }
        Ok(())
    }
}
