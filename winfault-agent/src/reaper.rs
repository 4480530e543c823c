//! Residual-state reaper.
//!
//! The safety net for crashes that bypass revert: a periodic task that
//! removes orphaned QoS policies carrying the reserved prefix. The sweep
//! itself lives on the controller, which guarantees it never runs while an
//! attack is active or the network lock is contended. The same sweep runs
//! once more on graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::controller::AttackController;
use crate::runner::CommandRunner;
use crate::service::ServiceProbe;

/// Spawns the periodic sweep.
pub fn spawn<R, P>(
    controller: Arc<AttackController<R, P>>,
    period: Duration,
) -> JoinHandle<()>
where
    R: CommandRunner + Send + Sync + 'static,
    P: ServiceProbe + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.tick().await; // immediate first tick
        loop {
            debug!("reaper sweep");
            if let Err(e) = controller.sweep_orphaned_policies().await {
                warn!(error = %e, "reaper sweep failed");
            }
            ticker.tick().await;
        }
    })
}
