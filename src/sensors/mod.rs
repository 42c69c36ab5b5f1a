//! Sensor and relay gateway
//!
//! Refreshes the [`RoomState`] from the temperature probe and the door-state
//! sources, and forwards actuation requests to the relay. The gateway holds no
//! policy beyond edge detection: a door's `last_change` only moves when its
//! `closed` value actually flips.
//!
//! ```text
//! TemperatureProbe ─┐
//! DoorStateSource  ─┼─► SensorGateway ──► RoomState
//! Actuator ◄────────┘        (actuate)
//! ```

pub mod actuator;
pub mod door_file;
pub mod onewire;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{ActuationError, SensorError};
use crate::room::{DoorId, RoomState};

pub use actuator::{GpioRelayActuator, ScriptActuator};
pub use door_file::FileDoorSource;
pub use onewire::OneWireProbe;

/// Hard upper bound for one actuator run
pub const ACTUATION_TIMEOUT: Duration = Duration::from_secs(10);

/// An attached temperature probe as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDescriptor {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait TemperatureProbe: Send + Sync {
    /// Lists attached probes, possibly none
    async fn enumerate(&self) -> Result<Vec<ProbeDescriptor>, SensorError>;

    async fn read_celsius(&self, probe: &ProbeDescriptor) -> Result<f64, SensorError>;
}

#[async_trait]
pub trait DoorStateSource: Send + Sync {
    /// Raw state text; containing `closed` means the door is closed
    async fn read_raw(&self, door: DoorId) -> Result<String, SensorError>;
}

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Triggers the door motor and returns whatever the actuator printed
    async fn actuate(&self, door: DoorId) -> Result<String, ActuationError>;
}

/// Parses a raw door reading
pub fn is_closed(raw: &str) -> bool {
    raw.contains("closed")
}

pub struct SensorGateway {
    probe: Box<dyn TemperatureProbe>,
    doors: Box<dyn DoorStateSource>,
    actuator: Box<dyn Actuator>,
    enabled: [bool; 2],
}

impl SensorGateway {
    pub fn new(
        probe: Box<dyn TemperatureProbe>,
        doors: Box<dyn DoorStateSource>,
        actuator: Box<dyn Actuator>,
        enable_door1: bool,
        enable_door2: bool,
    ) -> Self {
        Self {
            probe,
            doors,
            actuator,
            enabled: [enable_door1, enable_door2],
        }
    }

    pub fn is_enabled(&self, door: DoorId) -> bool {
        self.enabled[door.number() as usize - 1]
    }

    /// Re-reads temperature and door states into `room`
    ///
    /// Every door is processed even when the temperature read fails; the first
    /// error seen is returned once everything has been attempted.
    pub async fn refresh(
        &self,
        room: &mut RoomState,
        now: DateTime<Utc>,
    ) -> Result<(), SensorError> {
        room.last_refresh = now;

        let mut first_error = self.refresh_temperature(room).await.err();

        for door in DoorId::ALL {
            if let Err(e) = self.refresh_door(room, door, now).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn refresh_temperature(&self, room: &mut RoomState) -> Result<(), SensorError> {
        debug!("Getting one-wire device list");
        let probes = self.probe.enumerate().await.map_err(|e| {
            error!("{}", e);
            e
        })?;

        let Some(probe) = probes.first() else {
            let e = SensorError::NoProbeFound;
            error!("{}", e);
            return Err(e);
        };

        debug!("Reading temperature from {}", probe.name);
        match self.probe.read_celsius(probe).await {
            Ok(celsius) => {
                room.temperature_celsius = celsius;
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }

    async fn refresh_door(
        &self,
        room: &mut RoomState,
        door: DoorId,
        now: DateTime<Utc>,
    ) -> Result<(), SensorError> {
        let state = room.door_mut(door);

        if !self.is_enabled(door) {
            if !state.disabled {
                info!("{} is disabled, reporting it as closed", door);
                state.disabled = true;
                state.closed = true;
                state.last_change = now;
            }
            return Ok(());
        }
        state.disabled = false;

        let raw = self.doors.read_raw(door).await.map_err(|e| {
            error!("{}", e);
            e
        })?;
        debug!("Read {} state as {:?}", door, raw.trim());

        let closed = is_closed(&raw);
        if state.observe(closed, now) {
            info!(
                "{} ({}) is now {}",
                door,
                state.name,
                if closed { "closed" } else { "open" }
            );
        }
        Ok(())
    }

    /// Triggers the relay for `door`
    ///
    /// Does not touch the room state; the next refresh observes the motion.
    pub async fn actuate(&self, door: DoorId) -> Result<(), ActuationError> {
        info!("Actuating {}", door);
        let result = tokio::time::timeout(ACTUATION_TIMEOUT, self.actuator.actuate(door))
            .await
            .unwrap_or(Err(ActuationError::TimedOut(ACTUATION_TIMEOUT)));

        match result {
            Ok(output) => {
                debug!("Actuator output for {}: {}", door, output.trim());
                Ok(())
            }
            Err(e) => {
                error!("Failed to actuate {}: {}", door, e);
                Err(e)
            }
        }
    }
}
