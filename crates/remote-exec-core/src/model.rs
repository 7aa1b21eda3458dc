//! Registry records and session snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetrySample;

/// Workspace identifier (e.g. `"playground"`).
pub type WorkspaceId = String;

/// Registry device identifier.
pub type DeviceId = u64;

/// Device record as returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub title: String,
    pub secret: String,
    /// Device type key, matched case-insensitively (`"ev3"`).
    #[serde(rename = "type")]
    pub device_type: String,
    /// Last-known sample per port. Only the telemetry aggregator writes this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peripherals: Option<BTreeMap<String, TelemetrySample>>,
}

impl Device {
    /// Create a device record without telemetry.
    #[must_use]
    pub fn new(
        id: DeviceId,
        title: impl Into<String>,
        secret: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            secret: secret.into(),
            device_type: device_type.into(),
            peripherals: None,
        }
    }

    /// Take registry metadata from `latest`, keeping this record's telemetry.
    ///
    /// The device type is left alone: a connected session compiles against
    /// the type it connected with until it reconnects.
    pub fn refresh_metadata(&mut self, latest: &Self) {
        self.title.clone_from(&latest.title);
        self.secret.clone_from(&latest.secret);
    }
}

/// Network address and protocol identifiers for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub address: String,
    pub client_id_prefix: String,
    pub device_identifier: String,
}

/// Connection status as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed,
}

/// Serializable view of the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub workspace: WorkspaceId,
    pub device: Device,
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// Whether the session has completed its handshake.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Category of a program error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Type,
    Runtime,
}

/// Severity of a program error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Line/column position in a source file (1-based lines, 0-based columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Source span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub start: Position,
    pub end: Position,
}

impl SourceLocation {
    /// Placeholder span for errors without a source position. Line 0 never
    /// occurs in a real span.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            file: None,
            start: Position { line: 0, column: 0 },
            end: Position { line: 0, column: 0 },
        }
    }
}

/// A compile or runtime error reported to the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub location: SourceLocation,
}

impl SourceError {
    /// Create an error-severity entry.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            location,
        }
    }

    /// Wrap a device-reported failure as a runtime error.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message, SourceLocation::unknown())
    }
}
