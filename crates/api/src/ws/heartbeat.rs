use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Period between ping rounds.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Ping every open session once per `period` until `cancel` fires.
///
/// Rounds with no open session are skipped.
pub async fn run_heartbeat(ws_manager: Arc<WsManager>, period: Duration, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                let sessions = ws_manager.connection_count().await;
                if sessions == 0 {
                    continue;
                }
                tracing::debug!(sessions, "Pinging media sessions");
                ws_manager.ping_all().await;
            }
        }
    }
    tracing::debug!("Heartbeat stopped");
}

/// Spawn [`run_heartbeat`] with [`HEARTBEAT_PERIOD`].
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_heartbeat(ws_manager, HEARTBEAT_PERIOD, cancel))
}
