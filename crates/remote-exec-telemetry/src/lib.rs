//! Telemetry decoding and aggregation for device peripherals.
//!
//! Provides:
//! - `decode` - textual motor/sensor readings into typed `Reading`s
//! - `TelemetryAggregator` - per-port last-known view with lazy staleness eviction

pub mod aggregator;
pub mod decode;

pub use aggregator::TelemetryAggregator;
pub use decode::{DecodeError, decode};
