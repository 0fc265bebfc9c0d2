use crate::models::SensorType;
use crate::mqtt_service::MqttService;
use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

/// Topics the connection currently wants delivered.
///
/// A topic is present iff its last request was a subscribe.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    topics: BTreeSet<String>,
}

impl SubscriptionSet {
    /// Returns `true` if the topic was not subscribed before.
    pub fn insert(&mut self, topic: &str) -> bool {
        self.topics.insert(topic.to_string())
    }

    /// Returns `true` if the topic was subscribed before.
    pub fn remove(&mut self, topic: &str) -> bool {
        self.topics.remove(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub name: String,
    pub topic: String,
}

/// Which topics a dashboard connection subscribes to and the chart series each one feeds,
/// in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub series: Vec<SeriesSpec>,
}

impl ConnectionProfile {
    pub fn for_sensors(sensor_types: &[SensorType]) -> Self {
        Self {
            series: sensor_types
                .iter()
                .map(|t| SeriesSpec {
                    name: t.name().to_string(),
                    topic: t.topic(),
                })
                .collect(),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.series.iter().map(|s| s.topic.clone()).collect()
    }

    pub fn series_index(&self, topic: &str) -> Option<usize> {
        self.series.iter().position(|s| s.topic == topic)
    }

    /// Look a series up by topic or by case-insensitive name.
    pub fn resolve_topic(&self, key: &str) -> Option<&str> {
        self.series
            .iter()
            .find(|s| s.topic == key || s.name.eq_ignore_ascii_case(key))
            .map(|s| s.topic.as_str())
    }
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self::for_sensors(&SensorType::ALL)
    }
}

/// Toggle input from the terminal: `on <topic|name>`, `off <topic|name>` or `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Toggle { topic: String, checked: bool },
    Status,
}

impl UiCommand {
    pub fn parse(line: &str, profile: &ConnectionProfile) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let target = parts.next();

        let checked = match (command, target) {
            ("status", None) => return Ok(UiCommand::Status),
            ("on", Some(_)) => true,
            ("off", Some(_)) => false,
            _ => return Err(format!("Unknown command {:?}; use on|off <topic> or status", line.trim())),
        };

        let key = target.unwrap_or_default();
        let topic = profile
            .resolve_topic(key)
            .ok_or_else(|| format!("Unknown series or topic {:?}", key))?;

        Ok(UiCommand::Toggle {
            topic: topic.to_string(),
            checked,
        })
    }
}

/// A named broker connection for one dashboard.
pub struct DashboardConnection {
    pub name: String,
    pub created_at: OffsetDateTime,
    profile: ConnectionProfile,
    service: Arc<MqttService>,
}

impl DashboardConnection {
    pub fn new(name: impl Into<String>, profile: ConnectionProfile, service: Arc<MqttService>) -> Self {
        Self {
            name: name.into(),
            created_at: OffsetDateTime::now_utc(),
            profile,
            service,
        }
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub fn subscribe_all_topics(&self) {
        for topic in self.profile.topics() {
            self.service.subscribe(&topic);
        }
    }

    /// Checked subscribes, unchecked unsubscribes. Returns whether the subscription set changed.
    pub fn set_subscribed(&self, topic: &str, checked: bool) -> bool {
        let changed = if checked {
            self.service.subscribe(topic)
        } else {
            self.service.unsubscribe(topic)
        };
        if changed {
            info!(
                "{}: {} '{}'",
                self.name,
                if checked { "subscribed to" } else { "unsubscribed from" },
                topic
            );
        }
        changed
    }
}
