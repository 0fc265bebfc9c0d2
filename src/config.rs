use crate::serial_reader::SerialSettings;
use dotenvy::dotenv;
use rumqttc::QoS;
use std::env;
use thiserror::Error;

pub const DEFAULT_BROKER_URL: &str = "mqtt://localhost:1883";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8083/mqtt";
pub const DEFAULT_STATUS_TOPIC: &str = "sensor/forwarder/status";
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerTransport {
    Tcp,
    Websocket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub url: String,
    pub transport: BrokerTransport,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Accepts `mqtt://host[:port]`, `tcp://host[:port]` and `ws://host[:port][/path]`.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::ParsingError(format!("Broker URL '{}' {}", url, reason));

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("has no scheme"))?;
        let (transport, default_port) = match scheme {
            "mqtt" | "tcp" => (BrokerTransport::Tcp, 1883),
            "ws" => (BrokerTransport::Websocket, 80),
            other => return Err(invalid(&format!("has unsupported scheme '{}'", other))),
        };

        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| invalid("has an invalid port"))?,
            ),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err(invalid("has no host"));
        }

        Ok(Self {
            url: url.to_string(),
            transport,
            host: host.to_string(),
            port,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: BrokerAddress,
    pub username: String,
    pub password: String,
    pub max_retries: i32,
    pub retry_interval_ms: u64,
    pub qos: QoS,
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub mqtt: MqttConfig,
    pub serial: SerialSettings,
    pub status_topic: String,
    pub log_level: tracing::Level,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub mqtt: MqttConfig,
    pub name: String,
    /// `None` keeps every point for the session.
    pub history_limit: Option<usize>,
    pub log_level: tracing::Level,
}

fn parse_var<T, F>(lookup: &F, key: &str, default: &str, what: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::ParsingError(format!("{} must be {}", key, what)))
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::MissingOrInvalid(key.to_string())),
    }
}

fn parse_qos<F>(lookup: &F) -> Result<QoS, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<u8, _>(lookup, "MQTT_QOS", "0", "0, 1 or 2")? {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        _ => Err(ConfigError::ParsingError("MQTT_QOS must be 0, 1 or 2".to_string())),
    }
}

fn parse_log_level<F>(lookup: &F) -> Result<tracing::Level, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, "LOG_LEVEL", "info", "one of trace, debug, info, warn, error")
}

impl MqttConfig {
    fn from_lookup<F>(lookup: &F, url_key: &str, default_url: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(url_key).unwrap_or_else(|| default_url.to_string());
        let config = Self {
            broker: BrokerAddress::parse(url.trim())?,
            username: lookup("MQTT_USERNAME").unwrap_or_default(),
            password: lookup("MQTT_PASSWORD").unwrap_or_default(),
            max_retries: parse_var(lookup, "MQTT_MAX_RETRIES", "-1", "an integer")?,
            retry_interval_ms: parse_var(lookup, "MQTT_RETRY_INTERVAL_MS", "5000", "a valid number")?,
            qos: parse_qos(lookup)?,
        };
        config.validate_timeouts()?;
        Ok(config)
    }

    /// Validate timeout values and other critical configurations.
    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        const MIN_TIMEOUT: u64 = 100;
        const MAX_TIMEOUT: u64 = 1_000_000;

        if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&self.retry_interval_ms) {
            return Err(ConfigError::ParsingError(format!(
                "MQTT_RETRY_INTERVAL_MS must be between {} and {} ms",
                MIN_TIMEOUT, MAX_TIMEOUT
            )));
        }

        Ok(())
    }
}

impl ForwarderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let serial = SerialSettings {
            path: lookup("SERIAL_PATH").unwrap_or_else(|| "/dev/ttyACM0".to_string()),
            baud_rate: parse_var(&lookup, "SERIAL_BAUD_RATE", "9600", "a valid baud rate")?,
            line_parser_enabled: parse_bool(&lookup, "SERIAL_LINE_PARSER", true)?,
        };
        if serial.path.trim().is_empty() {
            return Err(ConfigError::MissingOrInvalid("SERIAL_PATH".to_string()));
        }

        Ok(Self {
            mqtt: MqttConfig::from_lookup(&lookup, "MQTT_BROKER_URL", DEFAULT_BROKER_URL)?,
            serial,
            status_topic: lookup("MQTT_STATUS_TOPIC").unwrap_or_else(|| DEFAULT_STATUS_TOPIC.to_string()),
            log_level: parse_log_level(&lookup)?,
        })
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let history_limit: usize = parse_var(
            &lookup,
            "DASHBOARD_HISTORY_LIMIT",
            &DEFAULT_HISTORY_LIMIT.to_string(),
            "a non-negative integer",
        )?;

        Ok(Self {
            mqtt: MqttConfig::from_lookup(&lookup, "DASHBOARD_WS_URL", DEFAULT_WS_URL)?,
            name: lookup("DASHBOARD_NAME")
                .unwrap_or_else(|| "My custom sensor data over websocket".to_string()),
            history_limit: (history_limit > 0).then_some(history_limit),
            log_level: parse_log_level(&lookup)?,
        })
    }
}
