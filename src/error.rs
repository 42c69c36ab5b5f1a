//! Error taxonomy for the monitoring engine
//!
//! Sensor, sink and alert errors are contained by the component that hits
//! them and only logged. Actuation errors travel back to whoever asked for the
//! door to move. Configuration errors switch a feature off for the process
//! lifetime.

use std::time::Duration;
use thiserror::Error;

use crate::room::DoorId;

/// A feature is enabled but cannot run with the given configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{feature} is enabled but `{field}` has not been configured")]
    MissingCredential {
        feature: &'static str,
        field: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reading the probe or a door source failed; the stored value stays stale
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("No temperature device found. Cable could be disconnected")]
    NoProbeFound,

    #[error("Error getting one-wire device list: {0}")]
    ProbeEnumeration(String),

    #[error("Error reading temperature: {0}")]
    ProbeRead(String),

    #[error("Failed to read {door} state: {reason}")]
    DoorRead { door: DoorId, reason: String },
}

/// Moving a door failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuationError {
    /// The actuator entry point (script, interpreter, GPIO chip) is missing
    #[error("Actuator unavailable: {0}")]
    ActuatorUnavailable(String),

    /// The actuator ran and reported failure; `output` is what it printed
    #[error("Actuator failed: {output}")]
    ActuatorFailed { output: String },

    #[error("Actuator did not finish within {0:?}")]
    TimedOut(Duration),
}

/// A telemetry sink did not accept a publish
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkPublishError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Status {0} returned")]
    Status(u16),

    #[error("Publish did not finish within {0:?}")]
    TimedOut(Duration),
}

/// The alert channel did not take the message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlertSendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Alert rejected: {0}")]
    Rejected(String),
}

/// Broker session setup errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker address: {0}")]
    InvalidAddress(String),
}

/// Errors surfaced through [`crate::scheduler::RoomHandle`]
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Actuation error: {0}")]
    Actuation(#[from] ActuationError),

    /// The engine task has stopped
    #[error("Engine channel closed")]
    ChannelClosed,
}
