//! Effect option objects.
//!
//! Each network effect is a serializable options object that knows how to
//! emit its QoS commands and packet-engine invocations for apply and revert,
//! and renders a canonical fingerprint used for conflict detection and
//! idempotence. Options round-trip through the HTTP action state between
//! prepare, start, and stop.

mod bandwidth;
mod blackhole;
mod block_dns;
mod corruption;
mod delay;
mod loss;

pub use bandwidth::BandwidthOpts;
pub use blackhole::BlackholeOpts;
pub use block_dns::BlockDnsOpts;
pub use corruption::PacketCorruptionOpts;
pub use delay::DelayOpts;
pub use loss::PacketLossOpts;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use winfault_shared::{FaultError, Filter};

use crate::windivert;

/// Polarity of a command generation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Add,
    Delete,
}

/// The sum of all effect options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectOpts {
    Blackhole(BlackholeOpts),
    Delay(DelayOpts),
    PacketLoss(PacketLossOpts),
    PacketCorruption(PacketCorruptionOpts),
    Bandwidth(BandwidthOpts),
    BlockDns(BlockDnsOpts),
}

impl EffectOpts {
    /// QoS policy commands for the given mode. Only the bandwidth effect
    /// produces any.
    pub fn qos_commands(&self, mode: Mode) -> Result<Vec<String>, FaultError> {
        match self {
            EffectOpts::Bandwidth(opts) => opts.qos_commands(mode),
            _ => Ok(Vec::new()),
        }
    }

    /// Packet-engine commands for the given mode. Add-mode compiles the
    /// filter into a temp file whose path is recorded in the options so
    /// revert can unlink it.
    pub fn packet_commands(&mut self, mode: Mode) -> Result<Vec<String>, FaultError> {
        match self {
            EffectOpts::Blackhole(opts) => opts.packet_commands(mode),
            EffectOpts::Delay(opts) => opts.packet_commands(mode),
            EffectOpts::PacketLoss(opts) => opts.packet_commands(mode),
            EffectOpts::PacketCorruption(opts) => opts.packet_commands(mode),
            EffectOpts::Bandwidth(_) => Ok(Vec::new()),
            EffectOpts::BlockDns(opts) => opts.packet_commands(mode),
        }
    }

    /// Canonical rendering of the effect's observable parameters. Two
    /// requests producing the same network behavior render identically.
    pub fn fingerprint(&self) -> String {
        self.to_string()
    }

    /// Unlinks a filter file staged by an add-mode command pass that was not
    /// applied after all (idempotent re-apply).
    pub fn discard_filter_file(&mut self) {
        let slot = match self {
            EffectOpts::Blackhole(opts) => &mut opts.filter_file,
            EffectOpts::Delay(opts) => &mut opts.filter_file,
            EffectOpts::PacketLoss(opts) => &mut opts.filter_file,
            EffectOpts::PacketCorruption(opts) => &mut opts.filter_file,
            EffectOpts::BlockDns(opts) => &mut opts.filter_file,
            EffectOpts::Bandwidth(_) => return,
        };
        if let Some(path) = slot.take() {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Path of the staged filter file, if any.
    pub fn filter_file(&self) -> Option<&PathBuf> {
        match self {
            EffectOpts::Blackhole(opts) => opts.filter_file.as_ref(),
            EffectOpts::Delay(opts) => opts.filter_file.as_ref(),
            EffectOpts::PacketLoss(opts) => opts.filter_file.as_ref(),
            EffectOpts::PacketCorruption(opts) => opts.filter_file.as_ref(),
            EffectOpts::BlockDns(opts) => opts.filter_file.as_ref(),
            EffectOpts::Bandwidth(_) => None,
        }
    }
}

impl fmt::Display for EffectOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectOpts::Blackhole(opts) => fmt::Display::fmt(opts, f),
            EffectOpts::Delay(opts) => fmt::Display::fmt(opts, f),
            EffectOpts::PacketLoss(opts) => fmt::Display::fmt(opts, f),
            EffectOpts::PacketCorruption(opts) => fmt::Display::fmt(opts, f),
            EffectOpts::Bandwidth(opts) => fmt::Display::fmt(opts, f),
            EffectOpts::BlockDns(opts) => fmt::Display::fmt(opts, f),
        }
    }
}

/// Rejects durations the action contract forbids.
pub(crate) fn validate_duration(duration: Duration) -> Result<(), FaultError> {
    if duration < Duration::from_secs(1) {
        return Err(FaultError::InvalidDuration);
    }
    Ok(())
}

pub(crate) fn validate_percentage(percentage: u32) -> Result<(), FaultError> {
    if !(1..=100).contains(&percentage) {
        return Err(FaultError::InvalidPercentage(percentage));
    }
    Ok(())
}

/// Compiles the filter, writes the filter file, records its path.
pub(crate) fn stage_filter_file(
    filter: &Filter,
    slot: &mut Option<PathBuf>,
) -> Result<PathBuf, FaultError> {
    let path = windivert::build_filter_file(filter)?;
    *slot = Some(path.clone());
    Ok(path)
}

/// The revert command pair shared by all packet-engine effects, plus the
/// idempotent unlink of the filter file.
pub(crate) fn engine_teardown_commands(slot: &mut Option<PathBuf>) -> Vec<String> {
    if let Some(path) = slot.take() {
        let _ = std::fs::remove_file(path);
    }
    vec![
        "wdna_shutdown".to_string(),
        "cmd /c \"sc stop windivert || exit /b 0\"".to_string(),
    ]
}
