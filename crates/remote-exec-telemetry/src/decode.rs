//! Decoding of the device's textual port readings.
//!
//! Motors report `"<type> <position> <speed>"`, sensors report
//! `"<type> <mode> <value>"`.

use remote_exec_core::{ColorLabel, PeripheralKind, Reading, SensorValue};
use thiserror::Error;

/// Color sensor mode that reports a color index.
const COLOR_MODE: &str = "COL-COLOR";

/// Decode error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Expected 3 fields, got {0}")]
    FieldCount(usize),
    #[error("Invalid integer for {field}: {value}")]
    Integer { field: &'static str, value: String },
    #[error("Invalid number: {0}")]
    Number(String),
    #[error("Unknown color index: {0}")]
    Color(i64),
}

/// Decode a raw reading for a port of the given kind.
///
/// # Errors
/// Returns error if the payload does not have exactly three fields or a
/// field does not parse for its position.
pub fn decode(kind: PeripheralKind, payload: &str) -> Result<Reading, DecodeError> {
    let fields: Vec<&str> = payload.split_whitespace().collect();
    let [peripheral_type, second, third] = fields[..] else {
        return Err(DecodeError::FieldCount(fields.len()));
    };

    match kind {
        PeripheralKind::Motor => Ok(Reading::Motor {
            motor_type: peripheral_type.to_string(),
            position: parse_int("position", second)?,
            speed: parse_int("speed", third)?,
        }),
        PeripheralKind::Sensor => Ok(Reading::Sensor {
            sensor_type: peripheral_type.to_string(),
            mode: second.to_string(),
            value: sensor_value(peripheral_type, second, third)?,
        }),
    }
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, DecodeError> {
    value.parse().map_err(|_| DecodeError::Integer {
        field,
        value: value.to_string(),
    })
}

fn sensor_value(sensor_type: &str, mode: &str, raw: &str) -> Result<SensorValue, DecodeError> {
    if sensor_type.contains("touch") {
        return Ok(SensorValue::Pressed(parse_int("value", raw)? != 0));
    }
    if mode == COLOR_MODE {
        let index = parse_int("value", raw)?;
        return ColorLabel::from_index(index)
            .map(SensorValue::Color)
            .ok_or(DecodeError::Color(index));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(SensorValue::Number)
        .ok_or_else(|| DecodeError::Number(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor() {
        let reading = decode(PeripheralKind::Motor, "lego-ev3-l-motor 360 -120").unwrap();
        assert_eq!(
            reading,
            Reading::Motor {
                motor_type: "lego-ev3-l-motor".to_string(),
                position: 360,
                speed: -120,
            }
        );
    }

    #[test]
    fn test_motor_rejects_fractional_position() {
        let err = decode(PeripheralKind::Motor, "lego-ev3-m-motor 1.5 0").unwrap_err();
        assert!(matches!(err, DecodeError::Integer { field: "position", .. }));
    }

    #[test]
    fn test_touch_is_boolean() {
        let reading = decode(PeripheralKind::Sensor, "lego-ev3-touch TOUCH 1").unwrap();
        let Reading::Sensor { value, .. } = reading else {
            panic!("Wrong reading kind");
        };
        assert_eq!(value, SensorValue::Pressed(true));
    }

    #[test]
    fn test_color_mode_is_label() {
        let reading = decode(PeripheralKind::Sensor, "lego-ev3-color COL-COLOR 5").unwrap();
        let Reading::Sensor { mode, value, .. } = reading else {
            panic!("Wrong reading kind");
        };
        assert_eq!(mode, "COL-COLOR");
        assert_eq!(value, SensorValue::Color(ColorLabel::Red));

        assert_eq!(
            decode(PeripheralKind::Sensor, "lego-ev3-color COL-COLOR 9"),
            Err(DecodeError::Color(9))
        );
    }

    #[test]
    fn test_other_modes_are_numeric() {
        let reading = decode(PeripheralKind::Sensor, "lego-ev3-color COL-REFLECT 42").unwrap();
        let Reading::Sensor { value, .. } = reading else {
            panic!("Wrong reading kind");
        };
        assert_eq!(value, SensorValue::Number(42.0));

        let reading = decode(PeripheralKind::Sensor, "lego-ev3-us US-DIST-CM 12.5").unwrap();
        let Reading::Sensor { value, .. } = reading else {
            panic!("Wrong reading kind");
        };
        assert_eq!(value, SensorValue::Number(12.5));
    }

    #[test]
    fn test_field_count() {
        assert_eq!(
            decode(PeripheralKind::Sensor, "lego-ev3-touch TOUCH"),
            Err(DecodeError::FieldCount(2))
        );
        assert_eq!(decode(PeripheralKind::Motor, ""), Err(DecodeError::FieldCount(0)));
    }
}
