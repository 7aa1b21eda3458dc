//! Wire protocol for device links and the UI gateway.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use remote_exec_core::{DeviceId, DisplayKind, Notification, PeripheralKind, TransportEvent};
use remote_exec_pipeline::SourceFiles;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid program encoding: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Message from a device to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// Handshake accepted.
    Hello,
    /// Handshake rejected.
    Refused { reason: String },
    /// Program started or stopped.
    Status { running: bool },
    /// Output of the running program.
    Display { message: String, kind: DisplayKind },
    /// Raw peripheral reading, `"<type> <a> <b>"`.
    Monitor {
        port: String,
        kind: PeripheralKind,
        payload: String,
    },
}

impl DeviceMessage {
    /// Transport event this message surfaces as.
    #[must_use]
    pub fn into_event(self) -> TransportEvent {
        match self {
            Self::Hello => TransportEvent::Connected,
            Self::Refused { reason } => TransportEvent::Error(reason),
            Self::Status { running } => TransportEvent::StatusChange { running },
            Self::Display { message, kind } => TransportEvent::Display { message, kind },
            Self::Monitor {
                port,
                kind,
                payload,
            } => TransportEvent::Telemetry {
                port,
                kind,
                payload,
            },
        }
    }
}

/// Message from a client to its device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open the link.
    Hello { client_id: String },
    /// Assembled program (base64 encoded).
    Run { program: String },
    /// Stop the running program.
    Stop,
    /// Close the link.
    Bye,
}

impl ClientMessage {
    /// Create a run message from an assembled program.
    #[must_use]
    pub fn run(program: &[u8]) -> Self {
        Self::Run {
            program: BASE64.encode(program),
        }
    }

    /// Decode the program of a run message.
    ///
    /// # Errors
    /// Returns error if the payload is not valid base64.
    pub fn decode_program(&self) -> Result<Option<Bytes>, ProtocolError> {
        match self {
            Self::Run { program } => Ok(Some(Bytes::from(BASE64.decode(program)?))),
            _ => Ok(None),
        }
    }
}

/// Request from the UI to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayRequest {
    /// Refresh the device list.
    FetchDevices,
    /// Connect a workspace to a device.
    Connect { workspace: String, device_id: DeviceId },
    /// Close the current session.
    Disconnect,
    /// Compile and run a program on the connected device.
    Run {
        workspace: String,
        files: SourceFiles,
        entrypoint: String,
    },
    /// Stop the running program.
    Interrupt,
    /// Keepalive.
    Ping,
}

/// Gateway control replies that are not session notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Request failed before reaching the session.
    Error { message: String },
    /// Keepalive reply.
    Pong,
}

/// Message from the gateway to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Notification(Notification),
    Control(ControlMessage),
}

impl ServerMessage {
    /// Create an error reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Control(ControlMessage::Error {
            message: message.into(),
        })
    }

    #[must_use]
    pub const fn pong() -> Self {
        Self::Control(ControlMessage::Pong)
    }
}

/// Encode a message as one JSON text frame.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one JSON text frame.
///
/// # Errors
/// Returns error if the frame is not a valid message.
pub fn decode<'a, T: Deserialize<'a>>(frame: &'a str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}
