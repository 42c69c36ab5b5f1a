use chrono::NaiveDateTime;
use std::fmt;

use super::config::TopicLayout;
use crate::command::DoorCommand;

const PREVIEW_LEN: usize = 10;

/// A message received from the broker
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MQTTMessage {
    topic: String,
    content: String,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(PREVIEW_LEN).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: String, content: String) -> Self {
        MQTTMessage {
            topic,
            content,
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Interprets the message as a door command when it arrived on a set topic
    pub fn to_command(&self, topics: &TopicLayout) -> Option<DoorCommand> {
        topics.command_door(&self.topic).map(|door| DoorCommand {
            door,
            payload: self.content.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::DoorId;

    #[test]
    fn set_topics_become_commands() {
        let topics = TopicLayout::default();

        let msg = MQTTMessage::from_topic("home/garage/door1/set".to_string(), "ON\n".to_string());
        assert_eq!(
            msg.to_command(&topics),
            Some(DoorCommand {
                door: DoorId::One,
                payload: "ON".to_string()
            })
        );

        let other = MQTTMessage::from_topic("home/garage/door1".to_string(), "ON".to_string());
        assert_eq!(other.to_command(&topics), None);
    }

    #[test]
    fn display_truncates_long_payloads() {
        let msg = MQTTMessage::from_topic("t".to_string(), "0123456789abcdef".to_string());
        assert!(msg.to_string().ends_with("t: 0123456789"));

        let short = MQTTMessage::from_topic("t".to_string(), "ON".to_string());
        assert!(short.to_string().ends_with("t: ON"));
    }
}
