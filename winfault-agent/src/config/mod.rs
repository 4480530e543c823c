//! Configuration management module for the winfault agent.
//!
//! This module provides centralized configuration management with support
//! for CLI argument parsing, environment variable configuration, and
//! configuration validation.

pub mod app_config;
pub mod cli;

pub use app_config::{AppConfig, LogLevel};
pub use cli::CliConfig;

use anyhow::Result;

/// Main configuration manager that combines all configuration sources
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub app: AppConfig,
}

impl ConfigManager {
    /// Creates a new configuration manager from CLI arguments and environment
    pub fn from_cli_and_env() -> Result<Self> {
        let cli_config = CliConfig::from_args()?;
        cli_config.validate()?;
        let app_config = AppConfig::from_cli(&cli_config)?;
        Ok(Self { app: app_config })
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.app.validate()
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        self.app.init_logging()
    }
}
