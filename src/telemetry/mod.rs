//! Telemetry publish pipeline
//!
//! Two sinks with different policies run once per tick, cloud first:
//!
//! - [`cloud::CloudSink`]: change- and heartbeat-triggered HTTP push to the
//!   dashboard, deduplicated through its publish memory.
//! - [`mqtt_sink::MqttSink`]: level-triggered retained state on the broker,
//!   published on every tick.
//!
//! A sink that is switched off or lacks credentials is simply absent.

pub mod cloud;
pub mod mqtt_sink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SinkPublishError;
use crate::room::RoomState;

pub use cloud::{CloudOutcome, CloudSink, PublishMemory, PublishedValues};
pub use mqtt_sink::{MqttOutcome, MqttSink};

/// The publish capability the MQTT sink needs from a broker client
///
/// `Ok` must mean the message is on its way to a connected broker, not merely
/// queued; the command guard is released on it.
#[async_trait]
pub trait TelemetryBroker: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        retain: bool,
        payload: String,
    ) -> Result<(), SinkPublishError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    pub cloud: CloudOutcome,
    pub mqtt: MqttOutcome,
}

pub struct TelemetryPublisher {
    cloud: Option<CloudSink>,
    mqtt: Option<MqttSink>,
}

impl TelemetryPublisher {
    pub fn new(cloud: Option<CloudSink>, mqtt: Option<MqttSink>) -> Self {
        Self { cloud, mqtt }
    }

    pub async fn publish(&mut self, room: &RoomState, now: DateTime<Utc>) -> PublishReport {
        let cloud = match &mut self.cloud {
            Some(sink) => sink.publish(room, now).await,
            None => CloudOutcome::Disabled,
        };
        let mqtt = match &self.mqtt {
            Some(sink) => sink.publish(room).await,
            None => MqttOutcome::Disabled,
        };
        PublishReport { cloud, mqtt }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Published {
        pub topic: String,
        pub retain: bool,
        pub payload: String,
    }

    /// Broker that records publishes; topics listed in `failing` return errors
    #[derive(Clone, Default)]
    pub struct RecordingBroker {
        pub published: Arc<Mutex<Vec<Published>>>,
        pub failing: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingBroker {
        pub fn take(&self) -> Vec<Published> {
            std::mem::take(&mut *self.published.lock().unwrap())
        }
    }

    #[async_trait]
    impl TelemetryBroker for RecordingBroker {
        async fn publish(
            &self,
            topic: &str,
            retain: bool,
            payload: String,
        ) -> Result<(), SinkPublishError> {
            if self.failing.lock().unwrap().iter().any(|t| t == topic) {
                return Err(SinkPublishError::Transport("broker unreachable".to_string()));
            }
            self.published.lock().unwrap().push(Published {
                topic: topic.to_string(),
                retain,
                payload,
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::RecordingBroker;
    use super::*;
    use crate::mqtt::config::TopicLayout;
    use chrono::TimeZone;

    #[tokio::test]
    async fn absent_sinks_report_disabled() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let room = RoomState::new("Garage", "Workshop", now);
        let mut publisher = TelemetryPublisher::new(None, None);

        let report = publisher.publish(&room, now).await;

        assert_eq!(report.cloud, CloudOutcome::Disabled);
        assert_eq!(report.mqtt, MqttOutcome::Disabled);
    }

    #[tokio::test]
    async fn mqtt_sink_runs_without_cloud() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let room = RoomState::new("Garage", "Workshop", now);
        let broker = RecordingBroker::default();
        let mut publisher = TelemetryPublisher::new(
            None,
            Some(MqttSink::new(Box::new(broker.clone()), TopicLayout::default())),
        );

        let report = publisher.publish(&room, now).await;

        assert_eq!(report.mqtt, MqttOutcome::Published { failures: 0 });
        assert_eq!(broker.take().len(), 3);
    }
}
