use rumqttc::MqttOptions;
use std::time::Duration;

use crate::config::MqttBrokerConfig;
use crate::error::MqttError;
use crate::room::DoorId;

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub topics: TopicLayout,
}

impl MqttConfig {
    pub fn from_broker_config(config: &MqttBrokerConfig) -> Result<Self, MqttError> {
        let (host, port) = parse_broker_address(&config.host)?;
        Ok(Self {
            host,
            port,
            username: config.username.clone(),
            password: config.password.clone(),
            client_id: config.client_id.clone(),
            topics: TopicLayout::new(&config.topic_prefix),
        })
    }

    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options
            .set_credentials(self.username.clone(), self.password.clone())
            .set_keep_alive(KEEP_ALIVE);
        options
    }
}

/// Accepts `tcp://host:port`, `mqtt://host`, `host:port` or a bare host
pub fn parse_broker_address(address: &str) -> Result<(String, u16), MqttError> {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let (host, port) = match without_scheme.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| MqttError::InvalidAddress(address.to_string()))?;
            (host, port)
        }
        None => (without_scheme, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(MqttError::InvalidAddress(address.to_string()));
    }
    Ok((host.to_string(), port))
}

/// Topic names derived from one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    prefix: String,
}

impl TopicLayout {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn door_state(&self, door: DoorId) -> String {
        format!("{}/{}", self.prefix, door)
    }

    pub fn door_command(&self, door: DoorId) -> String {
        format!("{}/{}/set", self.prefix, door)
    }

    pub fn temperature(&self) -> String {
        format!("{}/temperature", self.prefix)
    }

    /// Which door a command topic addresses, if any
    pub fn command_door(&self, topic: &str) -> Option<DoorId> {
        DoorId::ALL
            .into_iter()
            .find(|door| self.door_command(*door) == topic)
    }
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self::new("home/garage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_broker_addresses() {
        assert_eq!(
            parse_broker_address("tcp://192.168.8.133:1883").unwrap(),
            ("192.168.8.133".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_address("broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_address("mqtt://broker:8883/").unwrap(),
            ("broker".to_string(), 8883)
        );
        assert!(parse_broker_address("tcp://broker:notaport").is_err());
        assert!(parse_broker_address("tcp://").is_err());
    }

    #[test]
    fn topic_layout_matches_home_assistant_names() {
        let topics = TopicLayout::new("home/garage/");

        assert_eq!(topics.door_state(DoorId::One), "home/garage/door1");
        assert_eq!(topics.door_command(DoorId::Two), "home/garage/door2/set");
        assert_eq!(topics.temperature(), "home/garage/temperature");
        assert_eq!(topics.command_door("home/garage/door2/set"), Some(DoorId::Two));
        assert_eq!(topics.command_door("home/garage/door2"), None);
    }

    #[test]
    fn builds_config_from_broker_section() {
        let broker = MqttBrokerConfig {
            enabled: true,
            host: "tcp://10.0.0.2:1884".to_string(),
            username: "garage".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        };

        let config = MqttConfig::from_broker_config(&broker).unwrap();

        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 1884);
        assert_eq!(config.options().broker_address(), ("10.0.0.2".to_string(), 1884));
    }
}
