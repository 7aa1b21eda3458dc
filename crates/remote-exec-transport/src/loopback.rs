//! In-process transport: JSON frames over channels to a device task.
//!
//! A device listens on an address of a [`LoopbackHub`]; the hub doubles as
//! the transport factory, so sessions reach simulated devices the same way
//! they would reach a broker.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use remote_exec_core::{
    DisplayKind, PeripheralKind, Transport, TransportError, TransportEvent, TransportFactory,
    TransportOptions,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::AbortHandle,
};

use crate::protocol::{self, ClientMessage, DeviceMessage, ProtocolError};

/// Event buffer per client.
const EVENT_CAPACITY: usize = 256;

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Registry of listening devices, keyed by address.
#[derive(Default)]
pub struct LoopbackHub {
    listeners: Mutex<HashMap<String, mpsc::UnboundedSender<DeviceLink>>>,
}

impl LoopbackHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept links on `address`. A later listener replaces an earlier one.
    #[must_use]
    pub fn listen(&self, address: impl Into<String>) -> mpsc::UnboundedReceiver<DeviceLink> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into(), tx);
        rx
    }

    fn dial(&self, address: &str) -> Option<mpsc::UnboundedSender<DeviceLink>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .filter(|tx| !tx.is_closed())
            .cloned()
    }
}

impl TransportFactory for LoopbackHub {
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError> {
        let listener = self.dial(&options.address);
        Ok(Arc::new(LoopbackTransport::new(options, listener)))
    }
}

/// Open link of a connected client.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    reader: AbortHandle,
}

/// Client half of a loopback link.
pub struct LoopbackTransport {
    options: TransportOptions,
    listener: Option<mpsc::UnboundedSender<DeviceLink>>,
    events: broadcast::Sender<TransportEvent>,
    link: Mutex<Option<Link>>,
}

impl LoopbackTransport {
    fn new(options: TransportOptions, listener: Option<mpsc::UnboundedSender<DeviceLink>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            options,
            listener,
            events,
            link: Mutex::new(None),
        }
    }

    fn write(&self, message: &ClientMessage) -> Result<(), TransportError> {
        let frame = encode_frame(message)?;
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        let open = link.as_ref().ok_or(TransportError::Closed)?;
        open.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

fn encode_frame(message: &ClientMessage) -> Result<String, TransportError> {
    protocol::encode(message).map_err(|e| TransportError::Send(e.to_string()))
}

/// Forward device frames to subscribers until the device hangs up.
///
/// The first `hello` or `refused` settles the handshake.
fn spawn_reader(
    mut inbound: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<TransportEvent>,
    handshake: oneshot::Sender<Result<(), String>>,
) -> AbortHandle {
    let task = tokio::spawn(async move {
        let mut handshake = Some(handshake);
        while let Some(frame) = inbound.recv().await {
            let message: DeviceMessage = match protocol::decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping device frame");
                    continue;
                }
            };
            match &message {
                DeviceMessage::Hello => {
                    if let Some(tx) = handshake.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                DeviceMessage::Refused { reason } => {
                    if let Some(tx) = handshake.take() {
                        let _ = tx.send(Err(reason.clone()));
                    }
                }
                _ => {}
            }
            let _ = events.send(message.into_event());
        }
        tracing::debug!("device closed loopback link");
    });
    task.abort_handle()
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let listener = self.listener.as_ref().ok_or_else(|| {
            TransportError::Handshake(format!("No device at {}", self.options.address))
        })?;

        let (to_device, from_client) = mpsc::unbounded_channel();
        let (to_client, from_device) = mpsc::unbounded_channel();
        let (handshake_tx, handshake_rx) = oneshot::channel();

        let reader = spawn_reader(from_device, self.events.clone(), handshake_tx);
        let previous = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Link {
                outbound: to_device,
                reader,
            });
        if let Some(previous) = previous {
            previous.reader.abort();
        }

        listener
            .send(DeviceLink {
                client_id: self.options.client_id.clone(),
                device_id: self.options.device_id.clone(),
                inbound: from_client,
                outbound: to_client,
            })
            .map_err(|_| TransportError::Handshake("Device stopped listening".into()))?;
        self.write(&ClientMessage::Hello {
            client_id: self.options.client_id.clone(),
        })?;

        match handshake_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(TransportError::Handshake(reason)),
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let link = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(link) = link else {
            return Ok(());
        };
        link.reader.abort();
        // The device may already be gone.
        let _ = link.outbound.send(encode_frame(&ClientMessage::Bye)?);
        Ok(())
    }

    async fn send(&self, program: Bytes) -> Result<(), TransportError> {
        self.write(&ClientMessage::run(&program))
    }

    async fn send_stop(&self) -> Result<(), TransportError> {
        self.write(&ClientMessage::Stop)
    }
}

/// Device half of a loopback link.
pub struct DeviceLink {
    /// Client ID announced by the connecting client.
    pub client_id: String,
    /// Device identifier the client was created for.
    pub device_id: String,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl DeviceLink {
    /// Receive the next client message. `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Result<ClientMessage, ProtocolError>> {
        let frame = self.inbound.recv().await?;
        Some(protocol::decode(&frame))
    }

    /// Send a message to the client.
    ///
    /// # Errors
    /// Returns error if the client is gone.
    pub fn send(&self, message: &DeviceMessage) -> Result<(), SendError> {
        let frame = protocol::encode(message)?;
        self.outbound
            .send(frame)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Accept the handshake.
    ///
    /// # Errors
    /// Returns error if the client is gone.
    pub fn accept(&self) -> Result<(), SendError> {
        self.send(&DeviceMessage::Hello)
    }

    /// Reject the handshake.
    ///
    /// # Errors
    /// Returns error if the client is gone.
    pub fn refuse(&self, reason: impl Into<String>) -> Result<(), SendError> {
        self.send(&DeviceMessage::Refused {
            reason: reason.into(),
        })
    }

    /// Report whether a program is running.
    ///
    /// # Errors
    /// Returns error if the client is gone.
    pub fn status(&self, running: bool) -> Result<(), SendError> {
        self.send(&DeviceMessage::Status { running })
    }

    /// Push program output.
    ///
    /// # Errors
    /// Returns error if the client is gone.
    pub fn display(&self, message: impl Into<String>, kind: DisplayKind) -> Result<(), SendError> {
        self.send(&DeviceMessage::Display {
            message: message.into(),
            kind,
        })
    }

    /// Push a raw peripheral reading.
    ///
    /// # Errors
    /// Returns error if the client is gone.
    pub fn monitor(
        &self,
        port: impl Into<String>,
        kind: PeripheralKind,
        payload: impl Into<String>,
    ) -> Result<(), SendError> {
        self.send(&DeviceMessage::Monitor {
            port: port.into(),
            kind,
            payload: payload.into(),
        })
    }
}
