use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use color_eyre::{eyre::eyre, Result};

use crate::error::ConfigError;

const CONFIG_DIR: &str = "garagewatch";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "GARAGEWATCH_CONFIG";

/// Alarm period used when the configured value is zero or negative
pub const DEFAULT_ALARM_PERIOD_MINUTES: i64 = 5;

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Logs at debug level when set
    pub verbose: bool,
    /// Seconds between two monitoring ticks
    pub tick_seconds: u64,
    /// Directory holding the `door<N>.state` files
    pub data_dir: PathBuf,
    pub doors: DoorsConfig,
    pub alarm: AlarmConfig,
    pub mqtt: MqttBrokerConfig,
    pub cloud: CloudConfig,
    pub telegram: TelegramConfig,
    pub actuator: ActuatorConfig,
    pub probe: ProbeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            tick_seconds: 60,
            data_dir: PathBuf::from("data"),
            doors: DoorsConfig::default(),
            alarm: AlarmConfig::default(),
            mqtt: MqttBrokerConfig::default(),
            cloud: CloudConfig::default(),
            telegram: TelegramConfig::default(),
            actuator: ActuatorConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DoorsConfig {
    pub door1_name: String,
    pub door2_name: String,
    pub enable_door1: bool,
    pub enable_door2: bool,
}

impl Default for DoorsConfig {
    fn default() -> Self {
        Self {
            door1_name: "Door 1".to_string(),
            door2_name: "Door 2".to_string(),
            enable_door1: true,
            enable_door2: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AlarmConfig {
    pub enabled: bool,
    /// Minutes a door may stay open before an alert goes out
    pub period_minutes: i64,
}

impl AlarmConfig {
    pub fn effective_period(&self) -> chrono::Duration {
        let minutes = if self.period_minutes <= 0 {
            DEFAULT_ALARM_PERIOD_MINUTES
        } else {
            self.period_minutes
        };
        chrono::Duration::minutes(minutes)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct MqttBrokerConfig {
    pub enabled: bool,
    /// `tcp://host:port`, `host:port` or just `host`
    pub host: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub topic_prefix: String,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            username: String::new(),
            password: String::new(),
            client_id: "garagewatch".to_string(),
            topic_prefix: "home/garage".to_string(),
        }
    }
}

impl MqttBrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("MQTT", "host", &self.host)?;
        require("MQTT", "username", &self.username)?;
        require("MQTT", "password", &self.password)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    pub api_key: String,
    /// Heartbeat period in minutes; zero publishes on every tick
    pub period_minutes: i64,
    pub base_url: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            period_minutes: 15,
            base_url: "https://api.thingspeak.com".to_string(),
        }
    }
}

impl CloudConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("Cloud dashboard", "api_key", &self.api_key)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl TelegramConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("Door alarm", "telegram.bot_token", &self.bot_token)?;
        require("Door alarm", "telegram.chat_id", &self.chat_id)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    /// External relay script, invoked with the door number
    #[default]
    Script,
    /// Relay wired straight to a GPIO pin
    Gpio,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    pub interpreter: String,
    pub script: PathBuf,
    pub door1_pin: u8,
    pub door2_pin: u8,
    pub pulse_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kind: ActuatorKind::Script,
            interpreter: "python3".to_string(),
            script: PathBuf::from("relay.py"),
            door1_pin: 17,
            door2_pin: 27,
            pulse_ms: 500,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ProbeConfig {
    pub devices_dir: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            devices_dir: PathBuf::from("/sys/bus/w1/devices"),
        }
    }
}

impl Config {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    /// Resolves the config path: env var, then first CLI argument, then the
    /// user config directory.
    pub fn locate() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        if let Some(path) = std::env::args().nth(1) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the file at `path`; a missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config = Self::parse(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse config: {}", e))
    }
}

fn require(feature: &'static str, field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingCredential { feature, field })
    } else {
        Ok(())
    }
}
