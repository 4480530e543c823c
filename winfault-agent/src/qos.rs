//! Host QoS policy management.
//!
//! Bandwidth attacks are implemented as named, host-wide Windows QoS
//! policies that cap egress towards destination prefixes. Policy names carry
//! a reserved prefix so the reaper can find leftovers; everything mutating
//! QoS state runs through the SYSTEM-elevated scheduled-task wrapper.

use tracing::{enabled, trace, Level};

use winfault_shared::{FaultError, PortRange};

use crate::elevation;
use crate::runner::{CommandRunner, Shell};

/// Reserved name prefix for policies owned by this agent. The reaper matches
/// by prefix equality, never by substring.
pub const QOS_POLICY_PREFIX: &str = "STEADYBIT_QOS_";

/// Ordered suffix table for rate strings. `bit`-family values are taken
/// verbatim, `bps`-family values are bytes and multiplied by 8. The mapped
/// suffix is a PowerShell numeric multiplier.
const RATE_SUFFIXES: [(&str, &str, bool); 10] = [
    ("tbps", "TB", true),
    ("gbps", "GB", true),
    ("mbps", "MB", true),
    ("kbps", "KB", true),
    ("bps", "", true),
    ("tbit", "TB", false),
    ("gbit", "GB", false),
    ("mbit", "MB", false),
    ("kbit", "KB", false),
    ("bit", "", false),
];

/// Normalizes a user-supplied rate (`100mbit`, `1024kbps`, ...) into the
/// form embedded in policy names and `ThrottleRateActionBitsPerSecond`
/// arguments, e.g. `100MB`. Rates the driver cannot encode (below 8 bit/s)
/// are rejected.
pub fn sanitize_bandwidth(raw: &str) -> Result<String, FaultError> {
    for (suffix, mapped, is_bytes) in RATE_SUFFIXES {
        if let Some(at) = raw.find(suffix) {
            let mut numeric_str = raw.to_string();
            numeric_str.replace_range(at..at + suffix.len(), "");
            let mut numeric: u64 = numeric_str
                .parse()
                .map_err(|_| FaultError::InvalidBandwidth(raw.to_string()))?;
            if is_bytes {
                numeric *= 8;
            }
            let sanitized = format!("{numeric}{mapped}");
            return reject_unencodable(sanitized, raw);
        }
    }
    Err(FaultError::InvalidBandwidth(raw.to_string()))
}

/// Windows QoS policies cannot express rates below 8 bit/s: a sanitized rate
/// that is a bare digit 0..=7 has no valid encoding.
fn reject_unencodable(sanitized: String, raw: &str) -> Result<String, FaultError> {
    let mut chars = sanitized.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if ('0'..='7').contains(&c) {
            return Err(FaultError::InvalidBandwidth(format!(
                "windows qos policy does not support rate settings below 8bit/s ({raw})"
            )));
        }
    }
    Ok(sanitized)
}

/// Escapes an argument for interpolation into a PowerShell command line.
pub fn sanitize_ps_arg(arg: &str) -> String {
    let mut out = arg.replace('`', "``");
    for (from, to) in [
        ("$", "`$"),
        ("\"", "`\""),
        ("'", "''"),
        ("(", "`("),
        (")", "`)"),
        ("{", "`{"),
        ("}", "`}"),
        (";", "`;"),
        ("|", "`|"),
        ("&", "`&"),
        (">", "`>"),
        ("<", "`<"),
    ] {
        out = out.replace(from, to);
    }
    out
}

/// Derived policy name for one `(rate, cidr_index)` pair.
pub fn policy_name(rate: &str, index: usize) -> String {
    format!("{QOS_POLICY_PREFIX}{rate}_{index}")
}

/// `New-NetQosPolicy` command throttling egress towards `cidr` at max
/// precedence, with an optional destination port condition.
pub fn new_policy_command(
    name: &str,
    rate: &str,
    cidr: &str,
    ports: &PortRange,
) -> String {
    let mut port_condition = String::new();
    if !ports.is_any() {
        port_condition = format!(
            " -IPDstPortStartMatchCondition {} -IPDstPortEndMatchCondition {}",
            ports.from, ports.to
        );
    }
    format!(
        "New-NetQosPolicy -Name {name} -Precedence 255 -Confirm:`$false \
         -ThrottleRateActionBitsPerSecond {rate} -IPDstPrefixMatchCondition '{cidr}'{port_condition}"
    )
}

pub fn remove_policy_command(name: &str) -> String {
    format!("Remove-NetQosPolicy -Name {name} -Confirm:`$false")
}

/// Executes a QoS command batch through the elevated channel.
pub async fn execute_qos_commands<R: CommandRunner>(
    runner: &R,
    cmds: &[String],
) -> Result<String, FaultError> {
    if cmds.is_empty() {
        return Ok(String::new());
    }
    runner.run(cmds, Shell::Invoke).await
}

/// Lists the names of all policies carrying the reserved prefix.
pub async fn list_policy_names<R: CommandRunner>(
    runner: &R,
) -> Result<Vec<String>, FaultError> {
    let command = format!(
        "Get-NetQosPolicy | Where-Object {{ $_.Name -like \"{QOS_POLICY_PREFIX}*\" }} \
         | Select-Object -ExpandProperty Name"
    );
    let output = runner
        .run(&[command], Shell::Invoke)
        .await
        .map_err(|e| FaultError::QosCommandFailed {
            message: format!("failed to list QoS policies: {e}"),
        })?;

    Ok(output
        .lines()
        .map(str::trim)
        .filter(|name| name.starts_with(QOS_POLICY_PREFIX))
        .map(str::to_string)
        .collect())
}

/// Removes the given policies through the elevated channel, joining all
/// failures so a partial removal is never silent.
pub async fn remove_policies<R: CommandRunner>(
    runner: &R,
    names: &[String],
) -> Result<(), FaultError> {
    let mut err: Option<FaultError> = None;
    for name in names {
        let cmds = elevation::system_commands_for(&remove_policy_command(name));
        if let Err(e) = runner.run(&cmds, Shell::Invoke).await {
            err = Some(FaultError::join(err, e));
        }
    }
    match err {
        Some(e) => Err(FaultError::QosCommandFailed {
            message: format!("failed to remove QoS policies: {e}"),
        }),
        None => Ok(()),
    }
}

/// Trace-level dump of the agent's current policies around QoS mutations.
pub async fn log_current_policies<R: CommandRunner>(runner: &R, when: &str) {
    if !enabled!(Level::TRACE) {
        return;
    }
    match list_policy_names(runner).await {
        Ok(policies) => trace!(when, ?policies, "current QoS policies"),
        Err(e) => trace!(when, error = %e, "failed to get current QoS policies"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_family_is_taken_verbatim() {
        assert_eq!(sanitize_bandwidth("100mbit").unwrap(), "100MB");
        assert_eq!(sanitize_bandwidth("1024kbit").unwrap(), "1024KB");
        assert_eq!(sanitize_bandwidth("2gbit").unwrap(), "2GB");
        assert_eq!(sanitize_bandwidth("1tbit").unwrap(), "1TB");
        assert_eq!(sanitize_bandwidth("500bit").unwrap(), "500");
    }

    #[test]
    fn bps_family_is_eight_times_the_numeric_value() {
        assert_eq!(sanitize_bandwidth("100mbps").unwrap(), "800MB");
        assert_eq!(sanitize_bandwidth("1kbps").unwrap(), "8KB");
        assert_eq!(sanitize_bandwidth("3bps").unwrap(), "24");
        assert_eq!(sanitize_bandwidth("2tbps").unwrap(), "16TB");
    }

    #[test]
    fn rejects_rates_below_eight_bits() {
        assert!(sanitize_bandwidth("7bit").is_err());
        assert!(sanitize_bandwidth("0bit").is_err());
        // 1 byte/s is 8 bit/s and therefore fine.
        assert_eq!(sanitize_bandwidth("1bps").unwrap(), "8");
    }

    #[test]
    fn rejects_garbage() {
        assert!(sanitize_bandwidth("fast").is_err());
        assert!(sanitize_bandwidth("12parsec").is_err());
        assert!(sanitize_bandwidth("mbit").is_err());
        assert!(sanitize_bandwidth("1.5mbit").is_err());
    }

    #[test]
    fn policy_names_carry_prefix_rate_and_index() {
        assert_eq!(policy_name("100MB", 0), "STEADYBIT_QOS_100MB_0");
        assert_eq!(policy_name("8KB", 3), "STEADYBIT_QOS_8KB_3");
    }

    #[test]
    fn new_policy_command_without_ports() {
        let cmd = new_policy_command("STEADYBIT_QOS_100MB_0", "100MB", "1.1.1.0/24", &PortRange::ANY);
        assert!(cmd.starts_with("New-NetQosPolicy -Name STEADYBIT_QOS_100MB_0 -Precedence 255"));
        assert!(cmd.contains("-ThrottleRateActionBitsPerSecond 100MB"));
        assert!(cmd.contains("-IPDstPrefixMatchCondition '1.1.1.0/24'"));
        assert!(!cmd.contains("PortStartMatchCondition"));
    }

    #[test]
    fn new_policy_command_with_ports() {
        let ports = PortRange::new(8000, 8080).unwrap();
        let cmd = new_policy_command("STEADYBIT_QOS_8KB_1", "8KB", "10.0.0.0/16", &ports);
        assert!(cmd.contains("-IPDstPortStartMatchCondition 8000"));
        assert!(cmd.contains("-IPDstPortEndMatchCondition 8080"));
    }

    #[test]
    fn ps_arg_escaping() {
        assert_eq!(sanitize_ps_arg("plain"), "plain");
        assert_eq!(sanitize_ps_arg("a$b"), "a`$b");
        assert_eq!(sanitize_ps_arg("a;b|c"), "a`;b`|c");
        assert_eq!(sanitize_ps_arg("it's"), "it''s");
        assert_eq!(sanitize_ps_arg("`x"), "``x");
    }
}
