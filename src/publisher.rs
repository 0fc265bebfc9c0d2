use crate::forwarder::ReadingSink;
use crate::models::Reading;
use crate::mqtt_service::MqttService;
use crate::payload::encode_reading;
use std::sync::Arc;
use tracing::{error, info};

/// Publishes classified readings to `sensor/<type>` on the broker.
pub struct SensorPublisher {
    service: Arc<MqttService>,
}

impl SensorPublisher {
    pub fn new(service: Arc<MqttService>) -> Self {
        Self { service }
    }
}

impl ReadingSink for SensorPublisher {
    async fn publish(&self, reading: &Reading) -> bool {
        let topic = reading.topic();
        let payload = match encode_reading(reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode reading for '{}': {}", topic, e);
                return false;
            }
        };

        let sent = self.service.publish_message(&topic, payload, false);
        if sent {
            info!("Message published to topic: {} {}", topic, reading.value);
        }
        sent
    }
}
