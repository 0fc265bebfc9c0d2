use crate::config::{BrokerTransport, MqttConfig};
use crate::subscriber::SubscriptionSet;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Transport};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// Requests the client may queue while the event loop is not draining them.
pub const REQUEST_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A publish received from the broker, forwarded in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

pub struct MqttService {
    client_state: Mutex<ClientState>,
    client: Mutex<Option<AsyncClient>>,
    subscriptions: Mutex<SubscriptionSet>,
    inbound: Option<mpsc::UnboundedSender<InboundMessage>>,
    pub(crate) config: MqttConfig,
}

impl MqttService {
    /// Publish-only service.
    pub fn new(config: MqttConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Service that hands every incoming publish to the returned receiver.
    pub fn with_inbound(config: MqttConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::build(config, Some(tx)), rx)
    }

    fn build(config: MqttConfig, inbound: Option<mpsc::UnboundedSender<InboundMessage>>) -> Arc<Self> {
        Arc::new(Self {
            client_state: Mutex::new(ClientState::Disconnected),
            client: Mutex::new(None),
            subscriptions: Mutex::new(SubscriptionSet::default()),
            inbound,
            config,
        })
    }

    pub fn state(&self) -> ClientState {
        lock(&self.client_state).clone()
    }

    fn set_state(&self, state: ClientState) {
        *lock(&self.client_state) = state;
    }

    fn current_client(&self) -> Option<AsyncClient> {
        lock(&self.client).clone()
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let broker = &self.config.broker;
        let mut mqtt_options = match broker.transport {
            BrokerTransport::Tcp => MqttOptions::new(client_id, broker.host.as_str(), broker.port),
            BrokerTransport::Websocket => {
                let mut options = MqttOptions::new(client_id, broker.url.as_str(), broker.port);
                options.set_transport(Transport::Ws);
                options
            }
        };
        mqtt_options.set_keep_alive(Duration::from_secs(10));
        mqtt_options.set_clean_session(true);

        if !self.config.username.is_empty() && !self.config.password.is_empty() {
            mqtt_options.set_credentials(&self.config.username, &self.config.password);
        }
        mqtt_options
    }

    /// Install a fresh client and queue the current subscriptions on it. The
    /// returned event loop must be driven by [`MqttService::start`].
    pub fn connect(&self, client_id: &str) -> EventLoop {
        debug!("Configuring MQTT broker at {}...", self.config.broker.url);

        let (client, eventloop) = AsyncClient::new(self.options(client_id), REQUEST_CAPACITY);
        *lock(&self.client) = Some(client.clone());
        self.set_state(ClientState::Connecting);

        for topic in lock(&self.subscriptions).topics() {
            match client.try_subscribe(topic.clone(), self.config.qos) {
                Ok(_) => debug!("Queued subscription to topic '{}'.", topic),
                Err(e) => error!("Failed to queue subscription to topic '{}': {}", topic, e),
            }
        }
        eventloop
    }

    /// Drive the event loop, reconnecting with exponential backoff. Returns
    /// once `max_retries` reconnects failed; a negative value retries forever.
    pub async fn start(self: Arc<Self>, client_id: &str, mut eventloop: EventLoop) {
        info!("Starting MQTT service...");

        let initial_retry_interval = Duration::from_millis(self.config.retry_interval_ms);
        let max_retries = self.config.max_retries;
        let mut retry_interval = initial_retry_interval;
        let mut retries: i32 = 0;

        loop {
            loop {
                match eventloop.poll().await {
                    Ok(event) => {
                        if matches!(event, Event::Incoming(Packet::ConnAck(_))) {
                            retry_interval = initial_retry_interval;
                            retries = 0;
                        }
                        self.handle_event(event);
                    }
                    Err(e) => {
                        error!("Error in MQTT event loop: {:?}", e);
                        self.set_state(ClientState::Disconnected);
                        break;
                    }
                }
            }

            if max_retries >= 0 && retries >= max_retries {
                error!("Maximum number of retries ({}) reached. Stopping the service.", max_retries);
                *lock(&self.client) = None;
                self.set_state(ClientState::Error("retries exhausted".to_string()));
                break;
            }

            warn!(
                "Lost connection to MQTT broker. Retrying in {:?}...",
                retry_interval
            );
            retries += 1;
            sleep(retry_interval).await;
            retry_interval = (retry_interval * 2).min(Duration::from_secs(60));
            eventloop = self.connect(client_id);
        }
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::Publish(publish)) => {
                debug!("{} {}", publish.topic, String::from_utf8_lossy(&publish.payload));
                match &self.inbound {
                    Some(inbound) => {
                        let message = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if inbound.send(message).is_err() {
                            debug!("Inbound receiver dropped, discarding message.");
                        }
                    }
                    None => warn!("Unexpected publish received on topic: {}", publish.topic),
                }
            }
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker");
                self.set_state(ClientState::Connected);
            }
            Event::Outgoing(_) => {
                debug!("Outgoing event.");
            }
            _ => {
                debug!("Unhandled event: {:?}", event);
            }
        }
    }

    /// Register interest in `topic`. Returns `false` when it was already subscribed,
    /// in which case nothing is sent to the broker. Never waits on the broker.
    pub fn subscribe(&self, topic: &str) -> bool {
        if !lock(&self.subscriptions).insert(topic) {
            debug!("Already subscribed to topic '{}'.", topic);
            return false;
        }

        if let Some(client) = self.current_client() {
            match client.try_subscribe(topic, self.config.qos) {
                Ok(_) => info!("Subscribed to topic '{}'.", topic),
                Err(e) => error!("Failed to subscribe to topic '{}': {}", topic, e),
            }
        }
        true
    }

    /// Cancel interest in `topic`. Returns `false` when it was not subscribed.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        if !lock(&self.subscriptions).remove(topic) {
            debug!("Not subscribed to topic '{}'.", topic);
            return false;
        }

        if let Some(client) = self.current_client() {
            match client.try_unsubscribe(topic) {
                Ok(_) => info!("Unsubscribed from topic '{}'.", topic),
                Err(e) => error!("Failed to unsubscribe from topic '{}': {}", topic, e),
            }
        }
        true
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        lock(&self.subscriptions).topics()
    }

    /// Queue a publish without waiting for the broker. When the request queue
    /// is full or the client is gone the message is logged and dropped.
    pub fn publish_message(&self, topic: &str, payload: Vec<u8>, retain: bool) -> bool {
        match self.current_client() {
            Some(client) => match client.try_publish(topic, self.config.qos, retain, payload) {
                Ok(_) => true,
                Err(e) => {
                    error!("Dropping message for '{}': {}", topic, e);
                    false
                }
            },
            None => {
                error!("MQTT client is not connected. Dropping message for '{}'.", topic);
                false
            }
        }
    }

    pub fn disconnect(&self) {
        if let Some(client) = self.current_client() {
            if let Err(e) = client.try_disconnect() {
                warn!("Failed to disconnect cleanly: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;

    fn config_for(url: &str) -> MqttConfig {
        let url = url.to_string();
        DashboardConfig::from_lookup(move |key: &str| match key {
            "DASHBOARD_WS_URL" => Some(url.clone()),
            "MQTT_RETRY_INTERVAL_MS" => Some("5000".to_string()),
            _ => None,
        })
        .unwrap()
        .mqtt
    }

    #[test]
    fn test_subscribe_twice_is_a_no_op() {
        let service = MqttService::new(config_for("mqtt://127.0.0.1:1"));
        assert!(service.subscribe("sensor/temperature"));
        assert!(!service.subscribe("sensor/temperature"));
        assert_eq!(service.subscribed_topics(), vec!["sensor/temperature"]);

        assert!(service.unsubscribe("sensor/temperature"));
        assert!(!service.unsubscribe("sensor/temperature"));
        assert!(service.subscribed_topics().is_empty());
    }

    #[test]
    fn test_publish_without_client_is_dropped() {
        let service = MqttService::new(config_for("mqtt://127.0.0.1:1"));
        assert!(!service.publish_message("sensor/temperature", b"{}".to_vec(), false));
    }

    #[tokio::test]
    async fn test_connect_installs_client_immediately() {
        let service = MqttService::new(config_for("mqtt://127.0.0.1:1"));
        let _eventloop = service.connect("sensor_test");
        assert_eq!(service.state(), ClientState::Connecting);
        assert!(service.publish_message("sensor/forwarder/status", b"{}".to_vec(), true));
    }

    #[tokio::test]
    async fn test_publish_does_not_block_on_unreachable_broker() {
        let service = MqttService::new(config_for("mqtt://127.0.0.1:1"));
        let eventloop = service.connect("sensor_test");
        let task = tokio::spawn(service.clone().start("sensor_test", eventloop));
        sleep(Duration::from_millis(300)).await;

        let attempts = REQUEST_CAPACITY * 3;
        let sent = tokio::time::timeout(Duration::from_secs(1), async {
            (0..attempts)
                .filter(|_| service.publish_message("sensor/temperature", b"{}".to_vec(), false))
                .count()
        })
        .await
        .expect("publishing must not wait for the broker");

        assert!(sent < attempts);
        task.abort();
    }
}
