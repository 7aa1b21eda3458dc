//! Core abstractions for remote device execution sessions.
//!
//! This crate provides the shared building blocks:
//! - `Device`, `Endpoint`, `SessionSnapshot` - registry and session records
//! - `TelemetrySample` - timestamped port readings
//! - `Notification` / `NotificationStore` - observer notifications with history
//! - `DeviceRegistry`, `Transport`, `SessionObserver` traits
//! - `SessionConfig`

pub mod config;
pub mod model;
pub mod notification;
pub mod notification_store;
pub mod telemetry;
pub mod traits;

pub use config::SessionConfig;
pub use model::{
    ConnectionStatus, Device, DeviceId, Endpoint, ErrorKind, Position, SessionSnapshot, Severity,
    SourceError, SourceLocation, WorkspaceId,
};
pub use notification::{ExternalLibrary, LanguageConfig, Notification, Variant};
pub use notification_store::NotificationStore;
pub use telemetry::{ColorLabel, PeripheralKind, Reading, SensorValue, TelemetrySample};
pub use traits::{
    DeviceRegistry, DisplayKind, RegistryError, SessionObserver, Transport, TransportError,
    TransportEvent, TransportFactory, TransportOptions,
};
