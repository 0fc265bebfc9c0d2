use sensor_bridge::chart_feed::{ChartFeed, LogRenderer};
use sensor_bridge::config::DashboardConfig;
use sensor_bridge::mqtt_service::MqttService;
use sensor_bridge::service_utils::{handle_shutdown, init_logging, start_mqtt_service};
use sensor_bridge::subscriber::{ConnectionProfile, DashboardConnection, UiCommand};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match DashboardConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.log_level);

    let (mqtt_service, mut inbound) = MqttService::with_inbound(config.mqtt.clone());
    let profile = ConnectionProfile::default();
    let connection = DashboardConnection::new(config.name.clone(), profile.clone(), mqtt_service.clone());
    let mut feed = ChartFeed::new(profile, config.history_limit.into(), LogRenderer::default());

    feed.render();
    connection.subscribe_all_topics();
    let mut mqtt_task = start_mqtt_service(mqtt_service.clone(), "sensor_dashboard");
    info!(
        "{} created at {} (broker {}).",
        connection.name, connection.created_at, config.mqtt.broker.url
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = handle_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(message) = inbound.recv() => {
                if let Err(e) = feed.handle_message(&message) {
                    warn!("Dropping message on '{}': {}", message.topic, e);
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match UiCommand::parse(&line, connection.profile()) {
                    Ok(UiCommand::Toggle { topic, checked }) => {
                        connection.set_subscribed(&topic, checked);
                    }
                    Ok(UiCommand::Status) => {
                        info!(
                            "Broker {:?}, subscribed topics: {:?}",
                            mqtt_service.state(),
                            mqtt_service.subscribed_topics()
                        );
                    }
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Stopped reading toggle input: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut mqtt_task => {
                error!("MQTT service stopped. Exiting.");
                return ExitCode::FAILURE;
            }
            _ = &mut shutdown => break,
        }
    }

    mqtt_service.disconnect();
    mqtt_task.abort();
    info!("Dashboard shut down.");
    ExitCode::SUCCESS
}
