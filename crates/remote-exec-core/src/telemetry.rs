//! Telemetry sample types shared by the aggregator and observers.

use serde::{Deserialize, Serialize};

/// Whether a port drives a motor or reads a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralKind {
    Motor,
    Sensor,
}

/// Named colors reported by a color sensor in `COL-COLOR` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorLabel {
    None,
    Black,
    Blue,
    Green,
    Yellow,
    Red,
    White,
    Brown,
}

impl ColorLabel {
    /// Map the sensor's numeric color index to a label.
    #[must_use]
    pub const fn from_index(index: i64) -> Option<Self> {
        Some(match index {
            0 => Self::None,
            1 => Self::Black,
            2 => Self::Blue,
            3 => Self::Green,
            4 => Self::Yellow,
            5 => Self::Red,
            6 => Self::White,
            7 => Self::Brown,
            _ => return None,
        })
    }
}

/// Sensor value; its shape depends on the sensor type and mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum SensorValue {
    Pressed(bool),
    Color(ColorLabel),
    Number(f64),
}

/// Decoded payload of one port reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    Motor {
        #[serde(rename = "type")]
        motor_type: String,
        position: i64,
        speed: i64,
    },
    Sensor {
        #[serde(rename = "type")]
        sensor_type: String,
        mode: String,
        value: SensorValue,
    },
}

/// A timestamped reading from one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub port: String,
    pub payload: Reading,
    /// Unix epoch milliseconds at which the sample was received.
    pub observed_at: u64,
}

impl TelemetrySample {
    #[must_use]
    pub fn new(port: impl Into<String>, payload: Reading, observed_at: u64) -> Self {
        Self {
            port: port.into(),
            payload,
            observed_at,
        }
    }
}
