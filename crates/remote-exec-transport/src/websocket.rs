//! WebSocket gateway between a browser workspace and the session manager.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use remote_exec_core::{Device, DeviceId, DeviceRegistry, NotificationStore, TransportFactory};
use remote_exec_session::SessionManager;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::protocol::{self, GatewayRequest, ServerMessage};

/// Gateway handler state.
pub struct GatewayState<R, F>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    /// Session manager intents are forwarded to.
    pub manager: Arc<SessionManager<R, F>>,
    /// Notifications replayed to every socket.
    pub notifications: Arc<NotificationStore>,
}

impl<R, F> GatewayState<R, F>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    /// Create new gateway state.
    #[must_use]
    pub const fn new(
        manager: Arc<SessionManager<R, F>>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        Self {
            manager,
            notifications,
        }
    }
}

impl<R, F> Clone for GatewayState<R, F>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            notifications: Arc::clone(&self.notifications),
        }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<R, F>(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState<R, F>>,
) -> impl IntoResponse
where
    R: DeviceRegistry + 'static,
    F: TransportFactory + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<R, F>(socket: WebSocket, state: GatewayState<R, F>)
where
    R: DeviceRegistry + 'static,
    F: TransportFactory + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match protocol::encode(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Intents from this socket, applied one at a time in arrival order
    let (intents, queue) = mpsc::unbounded_channel::<GatewayRequest>();
    let intent_task = tokio::spawn(process_intents(state.clone(), queue, tx.clone()));

    // Replay history, then follow live notifications
    let mut notifications = state.notifications.history_plus_stream();
    let notify_tx = tx.clone();
    let notify_task = tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            if notify_tx
                .send(ServerMessage::Notification(notification))
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let request: GatewayRequest = match protocol::decode(msg.as_str()) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid gateway request: {e}");
                let _ = tx.send(ServerMessage::error(e.to_string()));
                continue;
            }
        };

        if intents.send(request).is_err() {
            break;
        }
    }

    // Let queued intents finish; they no longer have anyone to reply to.
    drop(intents);
    if let Err(e) = intent_task.await {
        tracing::error!("Intent worker failed: {e}");
    }
    notify_task.abort();
    send_task.abort();
}

/// Apply queued intents in order until the queue closes.
async fn process_intents<R, F>(
    state: GatewayState<R, F>,
    mut queue: mpsc::UnboundedReceiver<GatewayRequest>,
    tx: mpsc::UnboundedSender<ServerMessage>,
) where
    R: DeviceRegistry + 'static,
    F: TransportFactory + 'static,
{
    while let Some(request) = queue.recv().await {
        dispatch(&state, request, &tx).await;
    }
}

/// Forward a request to the session manager.
///
/// Each intent has taken effect when this returns. Connects only install
/// their session here and finish on their own task, so a later intent can
/// still supersede a handshake in flight.
async fn dispatch<R, F>(
    state: &GatewayState<R, F>,
    request: GatewayRequest,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) where
    R: DeviceRegistry + 'static,
    F: TransportFactory + 'static,
{
    let manager = &state.manager;
    match request {
        GatewayRequest::Ping => {
            let _ = tx.send(ServerMessage::pong());
        }
        GatewayRequest::FetchDevices => {
            if let Err(e) = manager.refresh_devices().await {
                let _ = tx.send(ServerMessage::error(e.to_string()));
            }
        }
        GatewayRequest::Connect {
            workspace,
            device_id,
        } => match find_device(manager, device_id).await {
            // The attempt runs to completion on its own task.
            Some(device) => drop(manager.begin_connect(workspace, device).await),
            None => {
                let message = format!("Unknown device {device_id}");
                let _ = tx.send(ServerMessage::error(message));
            }
        },
        GatewayRequest::Disconnect => manager.disconnect().await,
        GatewayRequest::Run {
            workspace,
            files,
            entrypoint,
        } => manager.run(&workspace, &files, &entrypoint).await,
        GatewayRequest::Interrupt => manager.interrupt().await,
    }
}

/// Look a device up in the last fetched list, refreshing once on a miss.
async fn find_device<R, F>(
    manager: &SessionManager<R, F>,
    device_id: DeviceId,
) -> Option<Device>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    let cached = manager.devices().await;
    if let Some(device) = cached.into_iter().find(|d| d.id == device_id) {
        return Some(device);
    }
    match manager.refresh_devices().await {
        Ok(devices) => devices.into_iter().find(|d| d.id == device_id),
        Err(e) => {
            tracing::warn!(device_id, error = %e, "device lookup failed");
            None
        }
    }
}

/// Create the gateway router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(GatewayState::new(manager, store)));
/// ```
#[must_use]
pub fn create_ws_router<R, F>(state: GatewayState<R, F>) -> axum::Router
where
    R: DeviceRegistry + 'static,
    F: TransportFactory + 'static,
{
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<R, F>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
