//! The single session record and its connection state.

use std::sync::Arc;

use remote_exec_core::{
    ConnectionStatus, Device, Endpoint, SessionSnapshot, Transport, WorkspaceId,
};
use remote_exec_pipeline::LanguageContext;
use remote_exec_telemetry::TelemetryAggregator;
use tokio::{sync::Mutex, task::AbortHandle};

/// Connection state; the transport client moves between variants.
pub(crate) enum Connection {
    Connecting {
        client: Option<Arc<dyn Transport>>,
        endpoint: Option<Endpoint>,
    },
    Connected {
        client: Arc<dyn Transport>,
        endpoint: Endpoint,
    },
    Failed {
        error: Option<String>,
        client: Option<Arc<dyn Transport>>,
    },
}

pub(crate) struct Session {
    pub(crate) workspace: WorkspaceId,
    pub(crate) device: Device,
    pub(crate) connection: Connection,
    pub(crate) telemetry: TelemetryAggregator,
    /// Set once the device type is known; shared by runs so each compile
    /// starts from the same context.
    pub(crate) language: Option<Arc<Mutex<LanguageContext>>>,
    /// Intent epoch that created this session.
    pub(crate) epoch: u64,
    pub(crate) pump: Option<AbortHandle>,
}

impl Session {
    pub(crate) fn connecting(
        workspace: WorkspaceId,
        device: Device,
        epoch: u64,
        telemetry: TelemetryAggregator,
    ) -> Self {
        Self {
            workspace,
            device,
            connection: Connection::Connecting {
                client: None,
                endpoint: None,
            },
            telemetry,
            language: None,
            epoch,
            pump: None,
        }
    }

    /// Client of whichever state the connection is in.
    pub(crate) fn client(&self) -> Option<Arc<dyn Transport>> {
        match &self.connection {
            Connection::Connecting { client, .. } | Connection::Failed { client, .. } => {
                client.clone()
            }
            Connection::Connected { client, .. } => Some(Arc::clone(client)),
        }
    }

    /// Client, only if the handshake completed.
    pub(crate) fn connected_client(&self) -> Option<Arc<dyn Transport>> {
        match &self.connection {
            Connection::Connected { client, .. } => Some(Arc::clone(client)),
            _ => None,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let mut device = self.device.clone();
        device.peripherals = self.telemetry.snapshot();

        let (status, endpoint, error) = match &self.connection {
            Connection::Connecting { endpoint, .. } => {
                (ConnectionStatus::Connecting, endpoint.clone(), None)
            }
            Connection::Connected { endpoint, .. } => {
                (ConnectionStatus::Connected, Some(endpoint.clone()), None)
            }
            Connection::Failed { error, .. } => (ConnectionStatus::Failed, None, error.clone()),
        };

        SessionSnapshot {
            workspace: self.workspace.clone(),
            device,
            status,
            endpoint,
            error,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Best-effort client teardown. Errors are logged and dropped.
pub(crate) async fn teardown(client: Arc<dyn Transport>, reason: &'static str) {
    if let Err(e) = client.disconnect().await {
        tracing::debug!(error = %e, reason, "ignoring transport disconnect error");
    }
}
