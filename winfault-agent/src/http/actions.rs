//! Action handlers and request mapping.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use winfault_shared::{
    any_networks, parse_cidr, Direction, FaultError, Filter, NetWithPortRange, PortRange,
};

use super::{into_api_error, ApiError, AppState};
use crate::attacks::{
    BandwidthOpts, BlackholeOpts, BlockDnsOpts, DelayOpts, EffectOpts, PacketCorruptionOpts,
    PacketLossOpts,
};
use crate::condense::{condense_excludes, EXCLUDE_LIMIT};
use crate::interfaces;
use crate::resolver;
use crate::runner::CommandRunner;
use crate::service::ServiceProbe;

const DEFAULT_DNS_PORT: u16 = 53;

const CONDENSATION_WARNING: &str =
    "Some excludes (to protect agent and extensions) were aggregated to reduce the number of \
     commands necessary. This may lead to less specific exclude rules, some traffic might not \
     be affected, as expected. You can avoid this by configuring a more specific attack \
     (e.g. by specifying ports or CIDRs).";

/// The subset of the prepare request body the network core consumes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    /// Attack duration in milliseconds.
    pub duration: Option<u64>,
    #[serde(default)]
    pub ip: Vec<String>,
    #[serde(default)]
    pub hostname: Vec<String>,
    #[serde(default)]
    pub port: Vec<String>,
    #[serde(default)]
    pub network_interface: Vec<String>,
    /// Delay in milliseconds (delay action).
    pub network_delay: Option<u64>,
    pub network_delay_jitter: Option<bool>,
    /// Rate string with units (bandwidth action).
    pub bandwidth: Option<String>,
    /// Loss percentage (package loss action).
    pub percentage: Option<u32>,
    /// Corruption percentage (package corruption action).
    pub network_corruption: Option<u32>,
    pub dns_port: Option<u16>,
    #[serde(default)]
    pub execution_context: ExecutionContext,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    #[serde(default)]
    pub restricted_endpoints: Vec<RestrictedEndpoint>,
}

/// A destination the agent must never disrupt, declared by the orchestrator.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictedEndpoint {
    pub cidr: String,
    #[serde(default)]
    pub port_min: u16,
    #[serde(default)]
    pub port_max: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub level: String,
    pub message: String,
}

impl Message {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: "info".to_string(),
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: "warn".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct PrepareResponse {
    pub state: EffectOpts,
    pub messages: Vec<Message>,
}

#[derive(Deserialize)]
pub struct StateBody {
    pub state: EffectOpts,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub state: EffectOpts,
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct StopResponse {
    pub messages: Vec<Message>,
}

fn parse_duration(req: &PrepareRequest) -> Result<Duration, FaultError> {
    match req.duration {
        Some(ms) if ms >= 1000 => Ok(Duration::from_millis(ms)),
        _ => Err(FaultError::InvalidDuration),
    }
}

/// Maps restricted endpoints to exclude entries, keeping name and URL as the
/// diagnostic comment.
pub fn restricted_to_excludes(
    endpoints: &[RestrictedEndpoint],
) -> Result<Vec<NetWithPortRange>, FaultError> {
    let mut excludes = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let net = parse_cidr(&endpoint.cidr)?;
        let ports = if endpoint.port_min == 0 && endpoint.port_max == 0 {
            PortRange::ANY
        } else {
            PortRange::new(endpoint.port_min, endpoint.port_max)?
        };
        let comment = format!("{} {}", endpoint.name, endpoint.url);
        excludes.push(NetWithPortRange::new(net, ports).with_comment(comment.trim()));
    }
    Ok(excludes)
}

/// Builds the selector for a request: resolve targets, substitute the
/// any-defaults, append the protective excludes, condense if oversized, and
/// scope to interfaces.
pub async fn map_request_to_filter<R: CommandRunner>(
    req: &PrepareRequest,
    runner: &R,
    own_networks: &[ipnet::IpNet],
    own_ports: &[u16],
) -> Result<(Filter, Vec<Message>), FaultError> {
    let mut targets = req.ip.clone();
    targets.extend(req.hostname.iter().cloned());
    let mut include_nets = resolver::map_to_networks(&targets).await?;
    if include_nets.is_empty() {
        include_nets = any_networks();
    }

    let mut port_ranges = resolver::parse_port_ranges(&req.port)?;
    if port_ranges.is_empty() {
        port_ranges = vec![PortRange::ANY];
    }

    let include: Vec<NetWithPortRange> = NetWithPortRange::cartesian(&include_nets, &port_ranges)
        .into_iter()
        .map(|npr| npr.with_comment("parameters"))
        .collect();

    let mut exclude = restricted_to_excludes(&req.execution_context.restricted_endpoints)?;
    exclude.extend(interfaces::own_endpoint_excludes(own_networks, own_ports));

    let mut messages = Vec::new();
    let (exclude, condensed) = condense_excludes(exclude, EXCLUDE_LIMIT);
    if condensed {
        messages.push(Message::warn(CONDENSATION_WARNING));
    }

    let interface_indexes = if req.network_interface.is_empty() {
        Vec::new()
    } else {
        interfaces::resolve_interface_indexes(runner, &req.network_interface).await?
    };

    Ok((
        Filter {
            include,
            exclude,
            interface_indexes,
            direction: Direction::Outgoing,
        },
        messages,
    ))
}

/// Builds bandwidth options from a request: bandwidth has no WinDivert
/// filter, only include CIDRs and an optional destination port range, and
/// must never overlap a restricted endpoint.
pub async fn map_request_to_bandwidth(req: &PrepareRequest) -> Result<EffectOpts, FaultError> {
    let duration = parse_duration(req)?;
    let bandwidth = req
        .bandwidth
        .clone()
        .ok_or_else(|| FaultError::InvalidBandwidth("bandwidth is required".to_string()))?;

    let mut targets = req.ip.clone();
    targets.extend(req.hostname.iter().cloned());
    if targets.is_empty() {
        return Err(FaultError::InvalidBandwidth(
            "hostname or IP required".to_string(),
        ));
    }
    let include_cidrs = resolver::map_to_networks(&targets).await?;

    let port_range = resolver::parse_port_ranges(&req.port)?
        .into_iter()
        .next()
        .unwrap_or(PortRange::ANY);

    let restricted = restricted_to_excludes(&req.execution_context.restricted_endpoints)?;

    Ok(EffectOpts::Bandwidth(BandwidthOpts::new(
        &bandwidth,
        include_cidrs,
        port_range,
        duration,
        &restricted,
    )?))
}

#[instrument(skip_all)]
pub async fn prepare_blackhole<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let duration = parse_duration(&req).map_err(into_api_error)?;
    let (filter, messages) =
        map_request_to_filter(&req, &state.runner, &state.own_networks, &state.own_ports)
            .await
            .map_err(into_api_error)?;

    let opts = BlackholeOpts::new(filter, duration).map_err(into_api_error)?;
    Ok(Json(PrepareResponse {
        state: EffectOpts::Blackhole(opts),
        messages,
    }))
}

#[instrument(skip_all)]
pub async fn prepare_delay<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let duration = parse_duration(&req).map_err(into_api_error)?;
    let delay = Duration::from_millis(req.network_delay.unwrap_or(0));
    let jitter = req.network_delay_jitter.unwrap_or(false);
    let (filter, messages) =
        map_request_to_filter(&req, &state.runner, &state.own_networks, &state.own_ports)
            .await
            .map_err(into_api_error)?;

    let opts = DelayOpts::new(filter, delay, jitter, duration).map_err(into_api_error)?;
    Ok(Json(PrepareResponse {
        state: EffectOpts::Delay(opts),
        messages,
    }))
}

#[instrument(skip_all)]
pub async fn prepare_package_loss<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let duration = parse_duration(&req).map_err(into_api_error)?;
    let loss = req.percentage.unwrap_or(0);
    let (filter, messages) =
        map_request_to_filter(&req, &state.runner, &state.own_networks, &state.own_ports)
            .await
            .map_err(into_api_error)?;

    let opts = PacketLossOpts::new(filter, loss, duration).map_err(into_api_error)?;
    Ok(Json(PrepareResponse {
        state: EffectOpts::PacketLoss(opts),
        messages,
    }))
}

#[instrument(skip_all)]
pub async fn prepare_package_corruption<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let duration = parse_duration(&req).map_err(into_api_error)?;
    let corruption = req.network_corruption.or(req.percentage).unwrap_or(0);
    let (filter, messages) =
        map_request_to_filter(&req, &state.runner, &state.own_networks, &state.own_ports)
            .await
            .map_err(into_api_error)?;

    let opts =
        PacketCorruptionOpts::new(filter, corruption, duration).map_err(into_api_error)?;
    Ok(Json(PrepareResponse {
        state: EffectOpts::PacketCorruption(opts),
        messages,
    }))
}

#[instrument(skip_all)]
pub async fn prepare_bandwidth<R, P>(
    State(_state): State<Arc<AppState<R, P>>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let opts = map_request_to_bandwidth(&req).await.map_err(into_api_error)?;
    Ok(Json(PrepareResponse {
        state: opts,
        messages: Vec::new(),
    }))
}

#[instrument(skip_all)]
pub async fn prepare_block_dns<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let duration = parse_duration(&req).map_err(into_api_error)?;
    let dns_port = req.dns_port.unwrap_or(DEFAULT_DNS_PORT);
    let (filter, messages) =
        map_request_to_filter(&req, &state.runner, &state.own_networks, &state.own_ports)
            .await
            .map_err(into_api_error)?;

    let opts = BlockDnsOpts::new(filter, dns_port, duration).map_err(into_api_error)?;
    Ok(Json(PrepareResponse {
        state: EffectOpts::BlockDns(opts),
        messages,
    }))
}

#[instrument(skip_all, fields(action))]
pub async fn start<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(action): Path<String>,
    Json(body): Json<StateBody>,
) -> Result<Json<StartResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let mut opts = body.state;
    let fingerprint = opts.fingerprint();
    info!(action = %action, fingerprint = %fingerprint, "starting attack");

    state
        .controller
        .apply(&mut opts)
        .await
        .map_err(into_api_error)?;

    Ok(Json(StartResponse {
        state: opts,
        messages: vec![Message::info(fingerprint)],
    }))
}

#[instrument(skip_all, fields(action))]
pub async fn stop<R, P>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(action): Path<String>,
    Json(body): Json<StateBody>,
) -> Result<Json<StopResponse>, ApiError>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    let mut opts = body.state;
    info!(action = %action, "stopping attack");

    state
        .controller
        .revert(&mut opts)
        .await
        .map_err(into_api_error)?;

    Ok(Json(StopResponse {
        messages: Vec::new(),
    }))
}
