use std::time::Duration;
use tracing::{debug, error, info};

use super::TelemetryBroker;
use crate::error::SinkPublishError;
use crate::mqtt::config::TopicLayout;
use crate::room::{DoorId, RoomState};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttOutcome {
    Disabled,
    /// All topics attempted; `failures` of them were not accepted
    Published { failures: usize },
}

impl MqttOutcome {
    pub fn all_published(&self) -> bool {
        matches!(self, MqttOutcome::Published { failures: 0 })
    }
}

/// Door payload as understood by Home Assistant covers: `ON` means closed
pub fn door_payload(closed: bool) -> &'static str {
    if closed {
        "ON"
    } else {
        "OFF"
    }
}

pub struct MqttSink {
    broker: Box<dyn TelemetryBroker>,
    topics: TopicLayout,
}

impl MqttSink {
    pub fn new(broker: Box<dyn TelemetryBroker>, topics: TopicLayout) -> Self {
        Self { broker, topics }
    }

    /// Publishes retained state for both doors and the temperature
    pub async fn publish(&self, room: &RoomState) -> MqttOutcome {
        info!("Publishing telemetry to MQTT");

        let mut messages: Vec<(String, String)> = DoorId::ALL
            .into_iter()
            .map(|door| {
                (
                    self.topics.door_state(door),
                    door_payload(room.door(door).closed).to_string(),
                )
            })
            .collect();
        messages.push((
            self.topics.temperature(),
            format!("{:.1}", room.temperature_celsius),
        ));

        let mut failures = 0;
        for (topic, payload) in messages {
            debug!("Publishing {} = {}", topic, payload);
            let publish = self.broker.publish(&topic, true, payload);
            let result = tokio::time::timeout(PUBLISH_TIMEOUT, publish)
                .await
                .unwrap_or(Err(SinkPublishError::TimedOut(PUBLISH_TIMEOUT)));
            if let Err(e) = result {
                error!("Error sending {} to MQTT Broker: {}", topic, e);
                failures += 1;
            }
        }
        MqttOutcome::Published { failures }
    }
}
