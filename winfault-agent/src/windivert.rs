//! WinDivert filter compilation and packet-engine rendezvous.
//!
//! The selector compiler turns a [`Filter`] into a single boolean WinDivert
//! expression over packet fields. The grammar:
//!
//! ```text
//! (tcp or udp)
//!   [ and inbound | and outbound ]        -- direction
//!   [ and ( ifIdx == i1 or ... ) ]        -- interfaces
//!   [ and ( include_clause or ... ) ]     -- include set
//!   [ and ( exclude_clause and ... ) ]    -- exclude set
//! ```
//!
//! Includes match destination fields for outgoing traffic, source fields for
//! incoming, both sides joined by `or` when the direction is both. Excludes
//! use ternary guards on both sides so non-matching packets pass freely.
//! Single-host networks emit `== ip`, single ports `== port`.
//!
//! The compiled expression is also written to a temp file handed to the
//! engine via `--file=`; the file path lives in the owning options object so
//! revert can unlink it.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use tempfile::Builder;
use tokio::time::{sleep, Instant};
use tracing::debug;

use winfault_shared::{is_single_host, start_end_ip, Direction, FaultError, Filter, PortRange};

use crate::attacks::Mode;
use crate::runner::{CommandRunner, Shell};
use crate::service::{ServiceProbe, ServiceState};

/// Name of the kernel driver service registered by the packet engine.
pub const WINDIVERT_SERVICE: &str = "windivert";

/// How long apply/revert waits for the driver service to change state.
pub const SERVICE_STATE_TIMEOUT: Duration = Duration::from_secs(10);

const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct FieldSet {
    addr_v4: &'static str,
    addr_v6: &'static str,
    tcp_port: &'static str,
    udp_port: &'static str,
}

const DST: FieldSet = FieldSet {
    addr_v4: "ip.DstAddr",
    addr_v6: "ipv6.DstAddr",
    tcp_port: "tcp.DstPort",
    udp_port: "udp.DstPort",
};

const SRC: FieldSet = FieldSet {
    addr_v4: "ip.SrcAddr",
    addr_v6: "ipv6.SrcAddr",
    tcp_port: "tcp.SrcPort",
    udp_port: "udp.SrcPort",
};

/// Compiles a filter into a WinDivert expression.
pub fn build_filter(filter: &Filter) -> String {
    let mut out = String::from("(tcp or udp)");

    match filter.direction {
        Direction::Outgoing => out.push_str(" and outbound"),
        Direction::Incoming => out.push_str(" and inbound"),
        Direction::Both => {}
    }

    if !filter.interface_indexes.is_empty() {
        out.push_str(" and (");
        let clauses: Vec<String> = filter
            .interface_indexes
            .iter()
            .map(|idx| format!("ifIdx == {idx}"))
            .collect();
        out.push_str(&clauses.join(" or "));
        out.push(')');
    }

    if !filter.include.is_empty() {
        out.push_str(" and (");
        let mut clauses = Vec::with_capacity(filter.include.len());
        for inc in &filter.include {
            let clause = match filter.direction {
                Direction::Outgoing => include_clause(&inc.net, &inc.ports, &DST),
                Direction::Incoming => include_clause(&inc.net, &inc.ports, &SRC),
                Direction::Both => format!(
                    "{} or {}",
                    include_clause(&inc.net, &inc.ports, &DST),
                    include_clause(&inc.net, &inc.ports, &SRC)
                ),
            };
            clauses.push(clause);
        }
        out.push_str(&clauses.join(" or "));
        out.push(')');
    }

    if !filter.exclude.is_empty() {
        out.push_str(" and (");
        let mut clauses = Vec::with_capacity(filter.exclude.len() * 2);
        for exc in &filter.exclude {
            clauses.push(exclude_clause(&exc.net, &exc.ports, &DST));
            clauses.push(exclude_clause(&exc.net, &exc.ports, &SRC));
        }
        out.push_str(&clauses.join(" and "));
        out.push(')');
    }

    out
}

fn addr_field(net: &IpNet, fields: &FieldSet) -> &'static str {
    match net {
        IpNet::V4(_) => fields.addr_v4,
        IpNet::V6(_) => fields.addr_v6,
    }
}

fn addr_expr(net: &IpNet, fields: &FieldSet) -> String {
    let field = addr_field(net, fields);
    let (start, end) = start_end_ip(net);
    if is_single_host(net) {
        format!("{field} == {start}")
    } else {
        format!("{field} >= {start} and {field} <= {end}")
    }
}

fn port_expr(ports: &PortRange, fields: &FieldSet) -> String {
    let (tcp, udp) = (fields.tcp_port, fields.udp_port);
    if ports.is_single() {
        let p = ports.from;
        format!("(( {tcp} == {p} ) or ( {udp} == {p} ))")
    } else {
        let (from, to) = ports.bounds();
        format!(
            "(( {tcp} >= {from} and {tcp} <= {to} ) or ( {udp} >= {from} and {udp} <= {to} ))"
        )
    }
}

fn port_expr_negated(ports: &PortRange, fields: &FieldSet) -> String {
    let (tcp, udp) = (fields.tcp_port, fields.udp_port);
    if ports.is_single() {
        let p = ports.from;
        format!("(( {tcp} != {p} ) or ( {udp} != {p} ))")
    } else {
        let (from, to) = ports.bounds();
        format!("(( {tcp} < {from} or {tcp} > {to} ) or ( {udp} < {from} or {udp} > {to} ))")
    }
}

fn include_clause(net: &IpNet, ports: &PortRange, fields: &FieldSet) -> String {
    format!(
        "( {} and {})",
        addr_expr(net, fields),
        port_expr(ports, fields)
    )
}

fn exclude_clause(net: &IpNet, ports: &PortRange, fields: &FieldSet) -> String {
    format!(
        "(( {} )? {}: true)",
        addr_expr(net, fields),
        port_expr_negated(ports, fields)
    )
}

/// Compiles the filter and writes it to a kept temp file: one line of UTF-8,
/// no trailing newline. The caller owns the path and unlinks it on revert.
pub fn build_filter_file(filter: &Filter) -> Result<PathBuf, FaultError> {
    let expression = build_filter(filter);
    write_filter_file(&expression)
}

pub fn write_filter_file(expression: &str) -> Result<PathBuf, FaultError> {
    let mut file = Builder::new()
        .prefix("wdna-filter-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| FaultError::FilterCompileFailed {
            message: format!("failed to create filter file: {e}"),
        })?;
    file.write_all(expression.as_bytes())?;
    let (_file, path) = file.keep().map_err(|e| FaultError::Io(e.error))?;
    Ok(path)
}

/// Runs the packet-engine command batch and waits for the WinDivert service
/// to reach `Running` (apply) or `Stopped` (revert).
pub async fn execute_windivert_commands<R, P>(
    runner: &R,
    probe: &P,
    cmds: &[String],
    mode: Mode,
) -> Result<(), FaultError>
where
    R: CommandRunner,
    P: ServiceProbe,
{
    if cmds.is_empty() {
        return Ok(());
    }

    runner.run(cmds, Shell::Detached).await?;

    match mode {
        Mode::Add => {
            await_service_state(probe, ServiceState::Running, SERVICE_STATE_TIMEOUT).await?;
            debug!("WinDivert service is running");
        }
        Mode::Delete => {
            await_service_state(probe, ServiceState::Stopped, SERVICE_STATE_TIMEOUT).await?;
            debug!("WinDivert service is stopped");
        }
    }
    Ok(())
}

/// Polls the service probe until the wanted state is reported or the timeout
/// elapses. A missing service counts as stopped: the driver unregisters
/// itself once the last handle closes.
pub async fn await_service_state<P: ServiceProbe>(
    probe: &P,
    wanted: ServiceState,
    timeout: Duration,
) -> Result<(), FaultError> {
    let deadline = Instant::now() + timeout;
    loop {
        match probe.query(WINDIVERT_SERVICE) {
            Ok(state) if state == wanted => return Ok(()),
            Ok(ServiceState::NotFound) if wanted == ServiceState::Stopped => return Ok(()),
            Ok(state) => {
                debug!(?state, ?wanted, "windivert service not yet in wanted state")
            }
            Err(e) => debug!(error = %e, "windivert service query failed"),
        }
        if Instant::now() >= deadline {
            return Err(match wanted {
                ServiceState::Running => FaultError::EngineDidNotStart,
                _ => FaultError::EngineDidNotStop,
            });
        }
        sleep(SERVICE_POLL_INTERVAL).await;
    }
}
