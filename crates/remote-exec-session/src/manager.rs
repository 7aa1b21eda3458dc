//! Session manager: owns the single session slot and serializes intents
//! against it.

use std::sync::Arc;

use remote_exec_core::{
    Device, DeviceRegistry, ExternalLibrary, Notification, RegistryError, SessionConfig,
    SessionObserver, SessionSnapshot, Transport, TransportEvent, TransportFactory,
    TransportOptions, WorkspaceId,
};
use remote_exec_pipeline::{Compiler, LanguageContext, device_types};
use remote_exec_telemetry::TelemetryAggregator;
use tokio::{
    sync::{
        Mutex, MutexGuard, RwLock,
        broadcast::{self, error::RecvError},
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    epoch::IntentEpoch,
    pump::{self, Clock},
    session::{Connection, Session, teardown},
};

/// Error attached to a session whose device has no endpoint.
pub const ENDPOINT_ERROR: &str = "Could not retrieve endpoint";

/// Length of the random part of a transport client ID.
const SESSION_ID_LEN: usize = 16;

/// State shared with per-connection event pumps.
pub(crate) struct Shared {
    pub(crate) slot: Mutex<Option<Session>>,
    pub(crate) epoch: IntentEpoch,
    pub(crate) observer: Arc<dyn SessionObserver>,
    pub(crate) config: SessionConfig,
    pub(crate) clock: Clock,
}

impl Shared {
    pub(crate) fn notify(&self, notification: Notification) {
        self.observer.notify(notification);
    }

    /// Push the slot's current state to the observer.
    pub(crate) fn publish(&self, slot: &Option<Session>) {
        self.notify(Notification::Session {
            session: slot.as_ref().map(Session::snapshot),
        });
    }

    /// The session created by `epoch`, if no newer intent replaced it.
    pub(crate) fn current<'a>(
        slot: &'a mut MutexGuard<'_, Option<Session>>,
        epoch: u64,
    ) -> Option<&'a mut Session> {
        slot.as_mut().filter(|s| s.epoch == epoch)
    }
}

/// Resolves with the first error the transport emits. Never resolves if the
/// stream closes without one.
async fn first_error(events: &mut broadcast::Receiver<TransportEvent>) -> String {
    loop {
        match events.recv().await {
            Ok(TransportEvent::Error(error)) => return error,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return std::future::pending().await,
        }
    }
}

/// Random alphanumeric suffix that keeps client IDs unique per attempt.
fn session_suffix() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SESSION_ID_LEN);
    id
}

/// Session manager for a single remote device connection.
///
/// All intents take `&self`; issue them from any task. The most recent
/// connect/disconnect intent always determines the final state.
pub struct SessionManager<R, F>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    registry: R,
    transports: F,
    pub(crate) compiler: Arc<dyn Compiler>,
    pub(crate) shared: Arc<Shared>,
    devices: RwLock<Vec<Device>>,
}

impl<R, F> SessionManager<R, F>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    /// Create a session manager with default configuration.
    #[must_use]
    pub fn new(
        registry: R,
        transports: F,
        compiler: Arc<dyn Compiler>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self::with_config(registry, transports, compiler, observer, SessionConfig::default())
    }

    /// Create a session manager with explicit configuration.
    #[must_use]
    pub fn with_config(
        registry: R,
        transports: F,
        compiler: Arc<dyn Compiler>,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            transports,
            compiler,
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                epoch: IntentEpoch::new(),
                observer,
                config,
                clock: Clock::new(),
            }),
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the current session, if any.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.slot.lock().await.as_ref().map(Session::snapshot)
    }

    /// Last fetched device list.
    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    /// Fetch the device list and refresh the active session's device
    /// metadata. The connection itself is left untouched.
    ///
    /// # Errors
    /// Returns error if the registry request fails.
    pub async fn refresh_devices(&self) -> Result<Vec<Device>, RegistryError> {
        let devices = self.registry.list_devices().await?;
        self.devices.write().await.clone_from(&devices);
        self.shared.notify(Notification::Devices {
            devices: devices.clone(),
        });

        let mut slot = self.shared.slot.lock().await;
        if let Some(session) = slot.as_mut() {
            if let Some(latest) = devices.iter().find(|d| d.id == session.device.id) {
                session.device.refresh_metadata(latest);
                self.shared.publish(&slot);
            }
        }

        Ok(devices)
    }

    /// Connect `workspace` to `device`, replacing any existing session.
    ///
    /// Returns once this attempt has settled or been superseded; inspect
    /// the snapshot for the outcome.
    pub async fn connect(&self, workspace: impl Into<WorkspaceId>, device: Device) {
        let workspace = workspace.into();
        let (epoch, previous) = self.install(&workspace, &device).await;
        self.establish(epoch, workspace, device, previous).await;
    }

    /// Install the `Connecting` session for `device` and finish the attempt
    /// on a spawned task.
    ///
    /// Every intent issued after this returns supersedes the attempt, so a
    /// caller forwarding intents one at a time keeps them in arrival order
    /// without waiting for the handshake.
    pub async fn begin_connect(
        self: &Arc<Self>,
        workspace: impl Into<WorkspaceId>,
        device: Device,
    ) -> JoinHandle<()>
    where
        R: 'static,
        F: 'static,
    {
        let workspace = workspace.into();
        let (epoch, previous) = self.install(&workspace, &device).await;
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.establish(epoch, workspace, device, previous).await })
    }

    /// Replace the slot with a fresh `Connecting` session under a new epoch.
    /// Returns the epoch and the replaced session's client.
    async fn install(
        &self,
        workspace: &WorkspaceId,
        device: &Device,
    ) -> (u64, Option<Arc<dyn Transport>>) {
        let mut slot = self.shared.slot.lock().await;
        let epoch = self.shared.epoch.advance();
        let telemetry = TelemetryAggregator::new(self.shared.config.staleness_window);
        let previous = slot.replace(Session::connecting(
            workspace.clone(),
            device.clone(),
            epoch,
            telemetry,
        ));
        self.shared.publish(&slot);
        info!(workspace = %workspace, device_id = device.id, epoch, "connecting");
        (epoch, previous.and_then(|s| s.client()))
    }

    /// Resolve, create and handshake the attempt installed under `epoch`.
    async fn establish(
        &self,
        epoch: u64,
        workspace: WorkspaceId,
        device: Device,
        previous: Option<Arc<dyn Transport>>,
    ) {
        let device_id = device.id;
        if let Some(client) = previous {
            teardown(client, "superseded by connect").await;
        }

        let resolved = self
            .shared
            .epoch
            .race(epoch, self.registry.resolve_endpoint(&device))
            .await;
        let endpoint = match resolved {
            None => {
                debug!(epoch, "connect superseded during endpoint resolution");
                return;
            }
            Some(Ok(Some(endpoint))) => endpoint,
            Some(Ok(None)) => {
                self.fail(epoch, None, ENDPOINT_ERROR.to_string()).await;
                return;
            }
            Some(Err(e)) => {
                self.fail(epoch, None, e.to_string()).await;
                return;
            }
        };

        let Some(device_type) = device_types::lookup(&device.device_type) else {
            let error = format!("Unsupported device type: {}", device.device_type);
            self.fail(epoch, None, error).await;
            return;
        };

        let options = TransportOptions {
            client_id: format!("{}{}", endpoint.client_id_prefix, session_suffix()),
            device_id: endpoint.device_identifier.clone(),
            address: endpoint.address.clone(),
        };
        let client = match self.transports.create(options) {
            Ok(client) => client,
            Err(e) => {
                self.fail(epoch, None, e.to_string()).await;
                return;
            }
        };
        // Subscribe before the handshake so no event is missed.
        let events = client.events();
        let errors = client.events();

        {
            let mut slot = self.shared.slot.lock().await;
            let Some(session) = Shared::current(&mut slot, epoch) else {
                drop(slot);
                debug!(epoch, "connect superseded before handshake");
                teardown(client, "superseded before handshake").await;
                return;
            };

            let context = LanguageContext::for_device(device_type);
            let config = context.config.clone();
            session.connection = Connection::Connecting {
                client: Some(Arc::clone(&client)),
                endpoint: Some(endpoint.clone()),
            };
            session.language = Some(Arc::new(Mutex::new(context)));
            session.pump = Some(pump::spawn(
                Arc::clone(&self.shared),
                epoch,
                workspace.clone(),
                events,
            ));

            self.shared.publish(&slot);
            self.shared.notify(Notification::Running {
                workspace: workspace.clone(),
                running: false,
            });
            self.shared.notify(Notification::ResetLanguage {
                workspace: workspace.clone(),
                config,
            });
        }

        match self.handshake(epoch, client.as_ref(), errors).await {
            None => {
                debug!(epoch, "connect superseded during handshake");
                teardown(client, "superseded during handshake").await;
            }
            Some(Ok(())) => {
                let mut slot = self.shared.slot.lock().await;
                if let Some(session) = Shared::current(&mut slot, epoch) {
                    session.connection = Connection::Connected { client, endpoint };
                    self.shared.publish(&slot);
                    info!(workspace = %workspace, device_id, epoch, "connected");
                } else {
                    drop(slot);
                    teardown(client, "superseded after handshake").await;
                }
            }
            Some(Err(error)) => {
                warn!(workspace = %workspace, device_id, epoch, %error, "handshake failed");
                teardown(Arc::clone(&client), "handshake failed").await;
                self.fail(epoch, Some(client), error).await;
            }
        }
    }

    /// Race the transport handshake (bounded by the configured timeout)
    /// against newer intents. An error event emitted before the handshake
    /// completes fails it.
    async fn handshake(
        &self,
        epoch: u64,
        client: &dyn Transport,
        mut errors: broadcast::Receiver<TransportEvent>,
    ) -> Option<Result<(), String>> {
        let connect = async {
            match self.shared.config.handshake_timeout {
                Some(limit) => match tokio::time::timeout(limit, client.connect()).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("Handshake timed out after {}ms", limit.as_millis())),
                },
                None => client.connect().await.map_err(|e| e.to_string()),
            }
        };
        let attempt = async {
            tokio::select! {
                biased;
                error = first_error(&mut errors) => Err(error),
                result = connect => result,
            }
        };
        self.shared.epoch.race(epoch, attempt).await
    }

    /// Move the session created by `epoch` to `Failed`, unless superseded.
    async fn fail(&self, epoch: u64, client: Option<Arc<dyn Transport>>, error: String) {
        let mut slot = self.shared.slot.lock().await;
        let Some(session) = Shared::current(&mut slot, epoch) else {
            debug!(epoch, "dropping failure of superseded connect");
            return;
        };
        info!(workspace = %session.workspace, epoch, %error, "connect failed");
        session.connection = Connection::Failed {
            error: Some(error),
            client,
        };
        self.shared.publish(&slot);
    }

    /// Close the current session. No-op without one.
    pub async fn disconnect(&self) {
        let previous = {
            let mut slot = self.shared.slot.lock().await;
            let Some(previous) = slot.take() else {
                return;
            };
            let epoch = self.shared.epoch.advance();
            self.shared.publish(&slot);
            self.shared.notify(Notification::SelectLibrary {
                workspace: previous.workspace.clone(),
                library: ExternalLibrary::None,
            });
            info!(workspace = %previous.workspace, epoch, "disconnected");
            previous
        };

        if let Some(client) = previous.client() {
            drop(previous);
            teardown(client, "disconnect").await;
        }
    }
}
