use std::fmt;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use winfault_shared::{FaultError, NetWithPortRange, PortRange};

use super::{validate_duration, Mode};
use crate::elevation;
use crate::qos;

/// Caps egress bandwidth towards the given destination CIDRs via host QoS
/// policies. No packet engine involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthOpts {
    /// Sanitized rate, e.g. `100MB`. Also embedded in the policy names.
    pub bandwidth: String,
    pub include_cidrs: Vec<IpNet>,
    pub port_range: PortRange,
    pub duration: Duration,
}

impl BandwidthOpts {
    /// Builds and validates bandwidth options. Targets overlapping a
    /// restricted endpoint are rejected outright: a partially applied
    /// throttle on the control plane is not recoverable.
    pub fn new(
        raw_bandwidth: &str,
        include_cidrs: Vec<IpNet>,
        port_range: PortRange,
        duration: Duration,
        restricted: &[NetWithPortRange],
    ) -> Result<Self, FaultError> {
        validate_duration(duration)?;
        if include_cidrs.is_empty() {
            return Err(FaultError::InvalidBandwidth(
                "hostname or IP required".to_string(),
            ));
        }
        let bandwidth = qos::sanitize_bandwidth(raw_bandwidth)?;

        for cidr in &include_cidrs {
            let target = NetWithPortRange::new(*cidr, port_range);
            for endpoint in restricted {
                if target.overlaps(endpoint) {
                    return Err(FaultError::TargetOverlapsRestrictedEndpoint {
                        target: target.to_string(),
                        endpoint: endpoint.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            bandwidth,
            include_cidrs,
            port_range,
            duration,
        })
    }

    /// One elevated policy mutation per include CIDR.
    pub(super) fn qos_commands(&self, mode: Mode) -> Result<Vec<String>, FaultError> {
        let rate = qos::sanitize_ps_arg(&self.bandwidth);
        let mut cmds = Vec::new();
        for (i, cidr) in self.include_cidrs.iter().enumerate() {
            let name = qos::policy_name(&rate, i);
            let command = match mode {
                Mode::Add => {
                    qos::new_policy_command(&name, &rate, &cidr.to_string(), &self.port_range)
                }
                Mode::Delete => qos::remove_policy_command(&name),
            };
            cmds.extend(elevation::system_commands_for(&command));
        }
        Ok(cmds)
    }
}

impl fmt::Display for BandwidthOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("limit bandwidth to {}", self.bandwidth);
        if !self.include_cidrs.is_empty() {
            out.push_str(" for:\n");
            for cidr in &self.include_cidrs {
                out.push(' ');
                out.push_str(&cidr.to_string());
                if !self.port_range.is_any() {
                    out.push(':');
                    out.push_str(&self.port_range.to_string());
                }
                out.push('\n');
            }
        }
        f.write_str(&out)
    }
}
