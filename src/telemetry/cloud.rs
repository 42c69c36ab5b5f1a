use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use tracing::{debug, error, info};

use crate::config::CloudConfig;
use crate::error::{ConfigError, SinkPublishError};
use crate::room::{DoorId, RoomState};

const PUBLISH_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// The values the dashboard was last sent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishedValues {
    pub door1_closed: bool,
    pub door2_closed: bool,
    pub temperature: f64,
}

impl PublishedValues {
    pub fn from_room(room: &RoomState) -> Self {
        Self {
            door1_closed: room.door(DoorId::One).closed,
            door2_closed: room.door(DoorId::Two).closed,
            temperature: room.temperature_celsius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishMemory {
    pub values: PublishedValues,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloudOutcome {
    Disabled,
    /// Nothing changed and the heartbeat is not due
    Skipped,
    Published,
    Failed(SinkPublishError),
}

/// Whether the dashboard needs an update
///
/// `period` of `None` publishes on every call.
pub fn should_publish(
    memory: Option<&PublishMemory>,
    current: &PublishedValues,
    period: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    let Some(memory) = memory else {
        return true;
    };
    let Some(period) = period else {
        return true;
    };
    now - memory.last_update >= period || memory.values != *current
}

/// ThingSpeak-compatible dashboard channel
pub struct CloudSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    period: Option<Duration>,
    memory: Option<PublishMemory>,
}

impl CloudSink {
    pub fn from_config(config: &CloudConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/update", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            period: (config.period_minutes > 0).then(|| Duration::minutes(config.period_minutes)),
            memory: None,
        })
    }

    pub fn memory(&self) -> Option<&PublishMemory> {
        self.memory.as_ref()
    }

    pub async fn publish(&mut self, room: &RoomState, now: DateTime<Utc>) -> CloudOutcome {
        let values = PublishedValues::from_room(room);
        if !should_publish(self.memory.as_ref(), &values, self.period, now) {
            debug!("Dashboard is up to date, skipping");
            return CloudOutcome::Skipped;
        }

        info!("Sending data to the cloud dashboard");
        let result = self.send(&values).await;

        // a failed attempt still counts, the next one waits for a change or the heartbeat
        self.memory = Some(PublishMemory {
            values,
            last_update: now,
        });

        match result {
            Ok(()) => CloudOutcome::Published,
            Err(e) => {
                error!("Error sending to the cloud dashboard: {}", e);
                CloudOutcome::Failed(e)
            }
        }
    }

    async fn send(&self, values: &PublishedValues) -> Result<(), SinkPublishError> {
        let query = [
            ("api_key", self.api_key.clone()),
            ("field1", flag(values.door1_closed).to_string()),
            ("field2", flag(values.door2_closed).to_string()),
            ("field3", "1".to_string()),
            ("field4", format!("{:.6}", values.temperature)),
        ];

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkPublishError::TimedOut(PUBLISH_TIMEOUT)
                } else {
                    SinkPublishError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(SinkPublishError::Status(status.as_u16()))
        }
    }
}

fn flag(closed: bool) -> &'static str {
    if closed {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn values(door1_closed: bool, temperature: f64) -> PublishedValues {
        PublishedValues {
            door1_closed,
            door2_closed: true,
            temperature,
        }
    }

    fn config(base_url: String, period_minutes: i64) -> CloudConfig {
        CloudConfig {
            enabled: true,
            api_key: "KEY".to_string(),
            period_minutes,
            base_url,
        }
    }

    #[test]
    fn first_call_always_publishes() {
        assert!(should_publish(None, &values(true, 20.0), Some(Duration::minutes(15)), t0()));
    }

    #[test]
    fn unchanged_values_wait_for_heartbeat() {
        let period = Some(Duration::minutes(15));
        let memory = PublishMemory {
            values: values(true, 20.0),
            last_update: t0(),
        };

        let same = values(true, 20.0);

        assert!(!should_publish(Some(&memory), &same, period, t0() + Duration::minutes(14)));
        assert!(should_publish(Some(&memory), &same, period, t0() + Duration::minutes(15)));
    }

    #[test]
    fn any_single_field_change_publishes() {
        let period = Some(Duration::minutes(15));
        let memory = PublishMemory {
            values: values(true, 20.0),
            last_update: t0(),
        };
        let later = t0() + Duration::minutes(1);

        assert!(should_publish(Some(&memory), &values(false, 20.0), period, later));
        assert!(should_publish(Some(&memory), &values(true, 20.5), period, later));
        let door2 = PublishedValues {
            door2_closed: false,
            ..values(true, 20.0)
        };
        assert!(should_publish(Some(&memory), &door2, period, later));
    }

    #[test]
    fn no_period_publishes_every_time() {
        let memory = PublishMemory {
            values: values(true, 20.0),
            last_update: t0(),
        };
        assert!(should_publish(Some(&memory), &values(true, 20.0), None, t0()));
    }

    #[tokio::test]
    async fn sends_thingspeak_fields_and_dedups() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/update")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api_key".into(), "KEY".into()),
                Matcher::UrlEncoded("field1".into(), "1".into()),
                Matcher::UrlEncoded("field2".into(), "0".into()),
                Matcher::UrlEncoded("field3".into(), "1".into()),
                Matcher::UrlEncoded("field4".into(), "19.250000".into()),
            ]))
            .with_status(200)
            .with_body("42")
            .expect(1)
            .create_async()
            .await;

        let mut sink = CloudSink::from_config(&config(server.url(), 15)).unwrap();
        let mut room = RoomState::new("Garage", "Workshop", t0());
        room.door_mut(DoorId::One).observe(true, t0());
        room.temperature_celsius = 19.25;

        assert_eq!(sink.publish(&room, t0()).await, CloudOutcome::Published);
        assert_eq!(
            sink.publish(&room, t0() + Duration::minutes(1)).await,
            CloudOutcome::Skipped
        );

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn change_and_heartbeat_each_publish_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/update")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("1")
            .expect(3)
            .create_async()
            .await;

        let mut sink = CloudSink::from_config(&config(server.url(), 15)).unwrap();
        let mut room = RoomState::new("Garage", "Workshop", t0());
        room.temperature_celsius = 21.0;
        let mut published = 0;

        for minute in 0..=16 {
            if minute == 1 {
                room.temperature_celsius = 21.5;
            }
            let outcome = sink.publish(&room, t0() + Duration::minutes(minute)).await;
            if outcome == CloudOutcome::Published {
                published += 1;
            }
        }

        // first tick, the temperature change at t=1, the heartbeat at t=16
        assert_eq!(published, 3);
        assert_eq!(
            sink.memory().map(|m| m.last_update),
            Some(t0() + Duration::minutes(16))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failure_still_updates_memory() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/update")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut sink = CloudSink::from_config(&config(server.url(), 15)).unwrap();
        let room = RoomState::new("Garage", "Workshop", t0());

        assert_eq!(
            sink.publish(&room, t0()).await,
            CloudOutcome::Failed(SinkPublishError::Status(500))
        );
        assert_eq!(sink.memory().map(|m| m.last_update), Some(t0()));
        assert_eq!(
            sink.publish(&room, t0() + Duration::minutes(1)).await,
            CloudOutcome::Skipped
        );
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let mut cfg = config("http://localhost".to_string(), 15);
        cfg.api_key.clear();
        assert!(CloudSink::from_config(&cfg).is_err());
    }
}
