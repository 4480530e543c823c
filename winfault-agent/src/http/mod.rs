//! Loopback HTTP boundary.
//!
//! The orchestrator drives the agent through a prepare/start/stop contract
//! per effect. Handlers decode the request fields the core consumes, build
//! the effect options, and delegate to the attack controller; the options
//! round-trip through the `state` field between calls so stop can clean up
//! exactly what start created.

pub mod actions;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ipnet::IpNet;
use serde::Serialize;

use winfault_shared::FaultError;

use crate::controller::AttackController;
use crate::runner::CommandRunner;
use crate::service::ServiceProbe;

/// Action identifiers advertised by the discovery endpoint.
pub const ACTION_IDS: [&str; 6] = [
    "network_blackhole",
    "network_delay",
    "network_package_loss",
    "network_package_corruption",
    "network_bandwidth",
    "network_block_dns",
];

pub struct AppState<R, P> {
    /// Shared with the reaper task, which must observe the same
    /// active-attack slot.
    pub controller: Arc<AttackController<R, P>>,
    pub runner: R,
    /// The agent's own addresses, auto-appended to every exclude list.
    pub own_networks: Vec<IpNet>,
    /// Control and health ports, protected on all owned addresses.
    pub own_ports: Vec<u16>,
}

/// Single error object returned on failure; the title carries the
/// taxonomic kind.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub title: String,
    pub detail: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorBody>);

pub(crate) fn into_api_error(err: FaultError) -> ApiError {
    let status = match &err {
        FaultError::ConflictingAttack => StatusCode::CONFLICT,
        FaultError::InvalidHostname(_)
        | FaultError::UnresolvableHostname(_)
        | FaultError::InvalidBandwidth(_)
        | FaultError::InvalidDuration
        | FaultError::InvalidPortRange(_)
        | FaultError::InvalidPercentage(_)
        | FaultError::InvalidCidr(_)
        | FaultError::TargetOverlapsRestrictedEndpoint { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            title: err.kind().to_string(),
            detail: err.to_string(),
        }),
    )
}

pub fn router<R, P>(state: Arc<AppState<R, P>>) -> Router
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(discovery))
        .route("/health", get(health))
        .route("/network_blackhole/prepare", post(actions::prepare_blackhole))
        .route("/network_delay/prepare", post(actions::prepare_delay))
        .route(
            "/network_package_loss/prepare",
            post(actions::prepare_package_loss),
        )
        .route(
            "/network_package_corruption/prepare",
            post(actions::prepare_package_corruption),
        )
        .route("/network_bandwidth/prepare", post(actions::prepare_bandwidth))
        .route("/network_block_dns/prepare", post(actions::prepare_block_dns))
        .route("/{action}/start", post(actions::start))
        .route("/{action}/stop", post(actions::stop))
        .with_state(state)
}

#[derive(Serialize)]
struct Discovery {
    actions: Vec<&'static str>,
}

async fn discovery<R, P>(State(_state): State<Arc<AppState<R, P>>>) -> Json<Discovery>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    Json(Discovery {
        actions: ACTION_IDS.to_vec(),
    })
}

async fn health() -> &'static str {
    "OK"
}
