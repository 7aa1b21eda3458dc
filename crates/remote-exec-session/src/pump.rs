//! Per-connection event pump: forwards transport events to the observer
//! and folds telemetry into the session.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use remote_exec_core::{Notification, TransportEvent, WorkspaceId};
use remote_exec_pipeline::display_notification;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::AbortHandle,
    time::Instant,
};
use tracing::{debug, trace, warn};

use crate::manager::Shared;

/// Millisecond clock for telemetry timestamps.
///
/// Anchored to wall time once, then advanced by `tokio::time` so that
/// paused-time runtimes stay deterministic.
pub(crate) struct Clock {
    wall_ms: u64,
    origin: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self {
            wall_ms,
            origin: Instant::now(),
        }
    }

    pub(crate) fn now_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.wall_ms.saturating_add(elapsed)
    }
}

/// Spawn the pump for the connection created by `epoch`.
///
/// The pump stops on its own once the epoch is superseded or the transport
/// drops its sender; the session aborts it on teardown.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    epoch: u64,
    workspace: WorkspaceId,
    mut events: broadcast::Receiver<TransportEvent>,
) -> AbortHandle {
    let task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(workspace = %workspace, epoch, skipped, "event pump lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !shared.epoch.is_current(epoch) {
                break;
            }
            handle(&shared, epoch, &workspace, event).await;
        }
        trace!(workspace = %workspace, epoch, "event pump stopped");
    });
    task.abort_handle()
}

async fn handle(shared: &Shared, epoch: u64, workspace: &str, event: TransportEvent) {
    match event {
        TransportEvent::Connected => trace!(workspace, epoch, "transport reports connected"),
        TransportEvent::Error(error) => warn!(workspace, epoch, %error, "transport error"),
        TransportEvent::StatusChange { running } => {
            shared.notify(Notification::Running {
                workspace: workspace.to_string(),
                running,
            });
        }
        TransportEvent::Display { message, kind } => {
            shared.notify(display_notification(workspace, message, kind));
        }
        TransportEvent::Telemetry {
            port,
            kind,
            payload,
        } => {
            let observed_at = shared.clock.now_millis();
            let mut slot = shared.slot.lock().await;
            let Some(session) = Shared::current(&mut slot, epoch) else {
                return;
            };
            let ingested = session
                .telemetry
                .ingest_raw(&port, kind, &payload, observed_at)
                .map(|_| ());
            match ingested {
                Ok(()) => shared.publish(&slot),
                Err(e) => debug!(workspace, port = %port, %payload, error = %e, "dropping telemetry"),
            }
        }
    }
}
