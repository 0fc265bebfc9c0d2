use crate::mqtt_service::MqttService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

pub fn init_logging(level: tracing::Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Start the MQTT service. The client is usable as soon as this returns.
pub fn start_mqtt_service(mqtt_service: Arc<MqttService>, client_prefix: &str) -> JoinHandle<()> {
    let mqtt_client_id = format!("{}_{}", client_prefix, Uuid::new_v4());
    let eventloop = mqtt_service.connect(&mqtt_client_id);

    let mqtt_service_clone = mqtt_service.clone();
    tokio::spawn(async move {
        mqtt_service_clone.start(&mqtt_client_id, eventloop).await;
    })
}

/// Publish a retained status message for this process.
pub fn publish_status(mqtt_service: &MqttService, topic: &str, status: &str, details: Option<&str>) -> bool {
    let message = serde_json::json!({
        "status": status,
        "details": details.unwrap_or_default(),
    });
    mqtt_service.publish_message(topic, message.to_string().into_bytes(), true)
}

/// Wait for ctrl-c. Never returns if the signal handler cannot be installed.
pub async fn handle_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to handle termination signal: {:?}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForwarderConfig;

    #[tokio::test]
    async fn test_status_right_after_start_is_queued() {
        let config = ForwarderConfig::from_lookup(|key: &str| match key {
            "MQTT_BROKER_URL" => Some("mqtt://127.0.0.1:1".to_string()),
            _ => None,
        })
        .unwrap();
        let service = MqttService::new(config.mqtt);
        let task = start_mqtt_service(service.clone(), "sensor_test");

        assert!(publish_status(&service, &config.status_topic, "running", None));
        task.abort();
    }
}
