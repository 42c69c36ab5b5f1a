//! Broker session lifecycle
//!
//! ```text
//! Configured ──start()──► Running ──run(cancel)──► (event loop until cancelled)
//! ```
//!
//! The session owns the rumqttc event loop. Everything it learns that matters
//! to the room (connects, failed subscriptions, door commands) is forwarded to
//! the engine task as an [`EngineMessage`]; it never touches room state itself.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnAck, Event, EventLoop, Packet, Publish, QoS, SubAck, SubscribeFilter,
    SubscribeReasonCode,
};
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::MQTTMessage;
use crate::error::SinkPublishError;
use crate::room::DoorId;
use crate::scheduler::EngineMessage;
use crate::telemetry::TelemetryBroker;

const REQUEST_CAPACITY: usize = 20;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Configured,
    Running,
}

#[machine]
pub struct MqttSession<S: SessionState> {
    config: MqttConfig,
    client: AsyncClient,
    eventloop: EventLoop,
    engine_tx: mpsc::Sender<EngineMessage>,
    status: MQTTStatus,
    connected: Arc<AtomicBool>,
}

impl<S: SessionState> MqttSession<S> {
    pub fn status(&self) -> &MQTTStatus {
        &self.status
    }
}

impl MqttSession<Configured> {
    /// Builds the client; no network traffic happens until the session runs
    pub fn create(
        config: MqttConfig,
        engine_tx: mpsc::Sender<EngineMessage>,
    ) -> (Self, MqttBroker) {
        debug!(
            "Creating MQTT session for {}@{}:{}",
            config.username, config.host, config.port
        );
        let (client, eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let broker = MqttBroker {
            client: client.clone(),
            connected: connected.clone(),
        };

        (
            Self::new(
                config,
                client,
                eventloop,
                engine_tx,
                MQTTStatus::default(),
                connected,
            ),
            broker,
        )
    }

    pub fn start(mut self) -> MqttSession<Running> {
        info!("Connecting to the MQTT Broker at {}", self.config.host);
        self.status.connection_state = ConnectionState::Connecting;
        self.transition()
    }
}

impl MqttSession<Running> {
    /// Drives the event loop until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Disconnecting from the MQTT Broker");
                    if let Err(e) = self.client.disconnect().await {
                        debug!("Disconnect request failed: {}", e);
                    }
                    break;
                }
                event = self.eventloop.poll() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(e) => {
                        if self.status.connection_state != ConnectionState::Reconnecting {
                            error!("Disconnected from MQTT Broker: {}", e);
                        } else {
                            debug!("Reconnect attempt failed: {}", e);
                        }
                        self.set_state(ConnectionState::Reconnecting);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => self.on_connected(ack).await,
            Event::Incoming(Packet::SubAck(ack)) => self.on_subscribed(ack).await,
            Event::Incoming(Packet::Publish(publish)) => self.on_publish(publish).await,
            Event::Incoming(Packet::Disconnect) => {
                warn!("Broker closed the MQTT session");
                self.set_state(ConnectionState::Disconnected);
            }
            _ => {}
        }
    }

    async fn on_connected(&mut self, ack: ConnAck) {
        info!(
            "Connected to the MQTT Broker (session present: {}). Subscribing to topics",
            ack.session_present
        );
        self.set_state(ConnectionState::Connected);
        self.status.last_activity = Some(chrono::Local::now());

        // retained commands from an earlier session must not move a door
        self.forward(EngineMessage::BrokerConnected).await;

        let filters: Vec<SubscribeFilter> = DoorId::ALL
            .into_iter()
            .map(|door| {
                SubscribeFilter::new(self.config.topics.door_command(door), QoS::AtLeastOnce)
            })
            .collect();
        if let Err(e) = self.client.subscribe_many(filters).await {
            error!("Error subscribing to command topics: {}", e);
            for door in DoorId::ALL {
                self.forward(EngineMessage::SubscriptionFailed(door)).await;
            }
        }
    }

    async fn on_subscribed(&mut self, ack: SubAck) {
        for (door, code) in DoorId::ALL.into_iter().zip(ack.return_codes) {
            if matches!(code, SubscribeReasonCode::Failure) {
                error!(
                    "Broker refused subscription to {}",
                    self.config.topics.door_command(door)
                );
                self.forward(EngineMessage::SubscriptionFailed(door)).await;
            }
        }
        info!("Subscription complete");
    }

    async fn on_publish(&mut self, publish: Publish) {
        self.status.messages_received += 1;
        self.status.last_activity = Some(chrono::Local::now());

        let message = MQTTMessage::from_topic(
            publish.topic.clone(),
            String::from_utf8_lossy(&publish.payload).into_owned(),
        );
        match message.to_command(&self.config.topics) {
            Some(command) => {
                info!("Command received: {}", message);
                self.forward(EngineMessage::Command(command)).await;
            }
            None => debug!("Ignoring message on {}", message.topic()),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.connected
            .store(state == ConnectionState::Connected, Ordering::Release);
        self.status.connection_state = state;
    }

    async fn forward(&mut self, message: EngineMessage) {
        if self.engine_tx.send(message).await.is_err() {
            warn!("Engine stopped, dropping broker event");
        }
    }
}

/// Publishing side of the session, handed to the telemetry publisher
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TelemetryBroker for MqttBroker {
    async fn publish(
        &self,
        topic: &str,
        retain: bool,
        payload: String,
    ) -> Result<(), SinkPublishError> {
        // the client queues requests while offline; only count a live session
        if !self.connected.load(Ordering::Acquire) {
            return Err(SinkPublishError::Transport(
                "not connected to the MQTT Broker".to_string(),
            ));
        }
        self.client
            .publish(topic, QoS::AtMostOnce, retain, payload.into_bytes())
            .await
            .map_err(|e| SinkPublishError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DoorCommand;
    use crate::mqtt::config::TopicLayout;
    use rumqttc::ConnectReturnCode;

    fn session() -> (MqttSession<Running>, mpsc::Receiver<EngineMessage>) {
        let (session, _broker, rx) = session_with_broker();
        (session, rx)
    }

    fn session_with_broker() -> (
        MqttSession<Running>,
        MqttBroker,
        mpsc::Receiver<EngineMessage>,
    ) {
        let config = MqttConfig {
            host: "localhost".to_string(),
            port: 1883,
            username: "garage".to_string(),
            password: "secret".to_string(),
            client_id: "garagewatch-test".to_string(),
            topics: TopicLayout::default(),
        };
        let (tx, rx) = mpsc::channel(8);
        let (session, broker) = MqttSession::create(config, tx);
        (session.start(), broker, rx)
    }

    fn connack() -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }))
    }

    #[tokio::test]
    async fn broker_only_accepts_publishes_while_connected() {
        let (mut session, broker, _rx) = session_with_broker();

        assert!(matches!(
            broker.publish("home/garage/door1", true, "ON".to_string()).await,
            Err(SinkPublishError::Transport(_))
        ));

        session.handle_event(connack()).await;
        assert!(broker
            .publish("home/garage/door1", true, "ON".to_string())
            .await
            .is_ok());

        session.handle_event(Event::Incoming(Packet::Disconnect)).await;
        assert!(broker
            .publish("home/garage/door1", true, "ON".to_string())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn session_future_can_be_spawned() {
        let (session, _rx) = session();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let task = tokio::spawn(session.run(cancel));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn connack_arms_guard_before_anything_else() {
        let (mut session, mut rx) = session();

        session.handle_event(connack()).await;

        assert!(matches!(rx.try_recv(), Ok(EngineMessage::BrokerConnected)));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.status().connection_state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn set_topic_publish_is_forwarded_as_command() {
        let (mut session, mut rx) = session();

        session
            .handle_event(Event::Incoming(Packet::Publish(Publish::new(
                "home/garage/door2/set",
                QoS::AtLeastOnce,
                "OFF",
            ))))
            .await;
        session
            .handle_event(Event::Incoming(Packet::Publish(Publish::new(
                "home/garage/door2",
                QoS::AtLeastOnce,
                "OFF",
            ))))
            .await;

        match rx.try_recv() {
            Ok(EngineMessage::Command(command)) => assert_eq!(
                command,
                DoorCommand {
                    door: DoorId::Two,
                    payload: "OFF".to_string()
                }
            ),
            _ => panic!("expected a door command"),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(session.status().messages_received, 2);
    }

    #[tokio::test]
    async fn refused_subscription_kills_that_door_only() {
        let (mut session, mut rx) = session();

        session
            .handle_event(Event::Incoming(Packet::SubAck(SubAck {
                pkid: 1,
                return_codes: vec![
                    SubscribeReasonCode::Success(QoS::AtLeastOnce),
                    SubscribeReasonCode::Failure,
                ],
            })))
            .await;

        assert!(matches!(
            rx.try_recv(),
            Ok(EngineMessage::SubscriptionFailed(DoorId::Two))
        ));
        assert!(rx.try_recv().is_err());
    }
}
