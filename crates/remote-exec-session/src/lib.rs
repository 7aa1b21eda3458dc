//! Single-session state machine for remote device execution.
//!
//! Provides:
//! - `SessionManager` - connect/disconnect/refresh/run/interrupt intents
//! - Race-based cancellation so the most recent intent always wins
//! - Per-connection event pump feeding telemetry and display messages

mod epoch;
mod manager;
mod pump;
mod run;
mod session;

pub use manager::{ENDPOINT_ERROR, SessionManager};
