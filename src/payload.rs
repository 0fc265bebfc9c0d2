//! JSON wire format shared by the forwarder and the dashboard:
//! `{"type": <string|code>, "value": <number>, "timestamp": <unix seconds>}`.

use crate::models::{InboundReading, Reading, SensorTag};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Payload is not valid JSON for a sensor reading: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Sensor value must be a finite number")]
    NonFiniteValue,
    #[error("Sensor type must not be empty")]
    EmptyType,
}

#[derive(Serialize)]
struct OutgoingPayload<'a> {
    #[serde(rename = "type")]
    sensor_type: &'a str,
    value: f64,
    timestamp: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TypeField {
    Name(String),
    Code(u64),
}

#[derive(Deserialize)]
struct IncomingPayload {
    #[serde(rename = "type")]
    sensor_type: TypeField,
    value: Option<f64>,
    timestamp: i64,
}

/// Serialize a reading for publishing. A NaN value is written as `null`.
pub fn encode_reading(reading: &Reading) -> Result<Vec<u8>, PayloadError> {
    let payload = OutgoingPayload {
        sensor_type: reading.sensor_type.name(),
        value: reading.value,
        timestamp: reading.timestamp,
    };
    Ok(serde_json::to_vec(&payload)?)
}

/// Decode an inbound message. Anything that is not a complete, finite reading is rejected.
pub fn decode_reading(bytes: &[u8]) -> Result<InboundReading, PayloadError> {
    let payload: IncomingPayload = serde_json::from_slice(bytes)?;

    let value = match payload.value {
        Some(v) if v.is_finite() => v,
        _ => return Err(PayloadError::NonFiniteValue),
    };

    let sensor = match payload.sensor_type {
        TypeField::Name(name) if name.is_empty() => return Err(PayloadError::EmptyType),
        TypeField::Name(name) => SensorTag::Name(name),
        TypeField::Code(code) => SensorTag::Code(code),
    };

    Ok(InboundReading {
        sensor,
        value,
        timestamp: payload.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorType;

    #[test]
    fn test_encode_reading() {
        let reading = Reading {
            sensor_type: SensorType::Humidity,
            value: 61.9,
            timestamp: 1000,
        };
        let json: serde_json::Value = serde_json::from_slice(&encode_reading(&reading).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "Humidity", "value": 61.9, "timestamp": 1000})
        );
    }

    #[test]
    fn test_nan_is_encoded_as_null_and_rejected_on_decode() {
        let reading = Reading {
            sensor_type: SensorType::Temperature,
            value: f64::NAN,
            timestamp: 5,
        };
        let bytes = encode_reading(&reading).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            r#"{"type":"Temperature","value":null,"timestamp":5}"#
        );
        assert!(matches!(decode_reading(&bytes), Err(PayloadError::NonFiniteValue)));
    }

    #[test]
    fn test_decode_accepts_name_or_code() {
        let by_name = decode_reading(br#"{"type":"Temperature","value":23.5,"timestamp":1000}"#).unwrap();
        assert_eq!(by_name.sensor, SensorTag::Name("Temperature".into()));
        assert_eq!(by_name.value, 23.5);
        assert_eq!(by_name.timestamp, 1000);

        let by_code = decode_reading(br#"{"type":1,"value":40,"timestamp":1001,"extra":true}"#).unwrap();
        assert_eq!(by_code.sensor, SensorTag::Code(1));
        assert_eq!(by_code.value, 40.0);
    }

    #[test]
    fn test_decode_rejects_schema_mismatch() {
        let rejected: [&[u8]; 6] = [
            b"not json",
            br#"{"type":"Temperature","timestamp":1000}"#,
            br#"{"type":"Temperature","value":"23","timestamp":1000}"#,
            br#"{"type":"Temperature","value":23,"timestamp":1000.5}"#,
            br#"{"value":23,"timestamp":1000}"#,
            br#"{"type":"","value":23,"timestamp":1000}"#,
        ];
        for bytes in rejected {
            assert!(decode_reading(bytes).is_err(), "{:?}", String::from_utf8_lossy(bytes));
        }
    }
}
