//! Transports and gateway for remote device sessions.
//!
//! Provides:
//! - Wire protocol (JSON, base64 programs)
//! - Loopback transport to in-process devices
//! - `SimulatedDevice` for demos and tests
//! - WebSocket gateway (feature: websocket)

pub mod loopback;
pub mod protocol;
pub mod simulator;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use loopback::{DeviceLink, LoopbackHub, LoopbackTransport, SendError};
pub use protocol::{
    ClientMessage, ControlMessage, DeviceMessage, GatewayRequest, ProtocolError, ServerMessage,
};
pub use simulator::SimulatedDevice;

#[cfg(feature = "websocket")]
pub use websocket::{GatewayState, create_ws_router};
