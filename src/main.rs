use sensor_bridge::config::ForwarderConfig;
use sensor_bridge::forwarder;
use sensor_bridge::mqtt_service::MqttService;
use sensor_bridge::publisher::SensorPublisher;
use sensor_bridge::service_utils::{handle_shutdown, init_logging, publish_status, start_mqtt_service};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match ForwarderConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.log_level);

    let mqtt_service = MqttService::new(config.mqtt.clone());
    let mut mqtt_task = start_mqtt_service(mqtt_service.clone(), "sensor_forwarder");

    let lines = match config.serial.open() {
        Ok(lines) => lines,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    publish_status(
        &mqtt_service,
        &config.status_topic,
        "running",
        Some("Forwarding serial readings."),
    );

    let publisher = SensorPublisher::new(mqtt_service.clone());
    let exit = tokio::select! {
        result = forwarder::run(lines, &publisher) => match result {
            Ok(stats) => {
                info!(
                    "Forwarded {} of {} lines ({} dropped).",
                    stats.published, stats.lines, stats.dropped
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        },
        _ = &mut mqtt_task => {
            error!("MQTT service stopped. Exiting.");
            return ExitCode::FAILURE;
        }
        _ = handle_shutdown() => ExitCode::SUCCESS,
    };

    publish_status(&mqtt_service, &config.status_topic, "shutdown", None);
    mqtt_service.disconnect();
    // let the event loop flush the status and disconnect packets
    let _ = tokio::time::timeout(Duration::from_millis(500), mqtt_task).await;

    info!("Forwarder shut down.");
    exit
}
