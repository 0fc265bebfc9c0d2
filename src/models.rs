use serde::Serialize;
use std::fmt;

/// Prefix shared by every sensor topic.
pub const TOPIC_PREFIX: &str = "sensor/";

/// Known sensor types, in the order the classifier tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    Temperature,
    Humidity,
}

impl SensorType {
    pub const ALL: [SensorType; 2] = [SensorType::Temperature, SensorType::Humidity];

    /// Marker name as it appears on the serial line.
    pub fn name(&self) -> &'static str {
        match self {
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Humidity",
        }
    }

    pub fn topic(&self) -> String {
        topic_for(self.name())
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `"sensor/" + lowercase(sensor_type)`
pub fn topic_for(sensor_type: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, sensor_type.to_lowercase())
}

/// One classified measurement on the forwarder side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: i64,
}

impl Reading {
    pub fn topic(&self) -> String {
        self.sensor_type.topic()
    }
}

/// Sensor type as carried by an inbound payload: either the name or a numeric code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorTag {
    Name(String),
    Code(u64),
}

impl fmt::Display for SensorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorTag::Name(name) => f.write_str(name),
            SensorTag::Code(code) => write!(f, "#{}", code),
        }
    }
}

/// A reading decoded from a broker message on the dashboard side.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundReading {
    pub sensor: SensorTag,
    pub value: f64,
    pub timestamp: i64,
}

/// Chart point: x is unix seconds, y is the floored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl From<&InboundReading> for Point {
    fn from(reading: &InboundReading) -> Self {
        Point {
            x: reading.timestamp,
            y: reading.value.floor() as i64,
        }
    }
}
