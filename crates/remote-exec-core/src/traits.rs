//! Collaborator traits: registry, transport and observer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    Notification,
    model::{Device, Endpoint},
    telemetry::PeripheralKind,
};

/// Registry error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Request(String),
}

/// Device registry client.
///
/// Credentials are the implementation's concern.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// List devices registered to the user.
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError>;

    /// Resolve a device to its transport endpoint.
    ///
    /// `Ok(None)` means the registry knows no endpoint for the device.
    async fn resolve_endpoint(&self, device: &Device) -> Result<Option<Endpoint>, RegistryError>;
}

#[async_trait]
impl<T: DeviceRegistry + ?Sized> DeviceRegistry for Arc<T> {
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError> {
        (**self).list_devices().await
    }

    async fn resolve_endpoint(&self, device: &Device) -> Result<Option<Endpoint>, RegistryError> {
        (**self).resolve_endpoint(device).await
    }
}

/// Transport error.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Transport closed")]
    Closed,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Transport error: {0}")]
    Other(String),
}

/// Kind of a display message pushed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    Output,
    Error,
    Result,
}

/// Event emitted by a transport client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed.
    Connected,
    /// Transport-level error.
    Error(String),
    /// Program started or stopped on the device.
    StatusChange { running: bool },
    /// Raw textual reading for one port.
    Telemetry {
        port: String,
        kind: PeripheralKind,
        payload: String,
    },
    /// Message from the running program.
    Display { message: String, kind: DisplayKind },
}

/// Parameters for constructing a transport client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Protocol client ID; unique per connection attempt.
    pub client_id: String,
    /// Device identifier on the broker.
    pub device_id: String,
    /// Broker address.
    pub address: String,
}

/// Publish/subscribe client connected to one device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to this client's events.
    ///
    /// Receivers only see events emitted after subscribing.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Perform the handshake; resolves once the device is reachable.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection. Must tolerate repeated calls.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Send an assembled program to run.
    async fn send(&self, program: Bytes) -> Result<(), TransportError>;

    /// Ask the device to stop the running program.
    async fn send_stop(&self) -> Result<(), TransportError>;
}

/// Constructs transport clients.
pub trait TransportFactory: Send + Sync {
    /// Create a client; no I/O happens until `connect`.
    ///
    /// # Errors
    /// Returns error if the client cannot be constructed.
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError>;
}

impl<T: TransportFactory + ?Sized> TransportFactory for Arc<T> {
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError> {
        (**self).create(options)
    }
}

/// Receives session side effects.
pub trait SessionObserver: Send + Sync {
    /// Deliver one notification. Must not block.
    fn notify(&self, notification: Notification);
}
