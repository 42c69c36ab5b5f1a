//! Room telemetry model
//!
//! [`RoomState`] is the single in-memory picture of the garage: both doors,
//! the temperature and when things last changed. It is owned by the engine
//! task, so it carries no locking of its own. [`RoomSnapshot`] is the
//! serializable copy handed out to readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two monitored doors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorId {
    One,
    Two,
}

impl DoorId {
    pub const ALL: [DoorId; 2] = [DoorId::One, DoorId::Two];

    /// 1-based door number used by the actuator and in topic names
    pub fn number(self) -> u8 {
        match self {
            DoorId::One => 1,
            DoorId::Two => 2,
        }
    }

    fn slot(self) -> usize {
        self.number() as usize - 1
    }
}

impl fmt::Display for DoorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "door{}", self.number())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoorState {
    pub name: String,
    pub closed: bool,
    /// Last observed transition of `closed`; input to the alarm duration
    pub last_change: DateTime<Utc>,
    /// Administratively disabled doors always report closed
    pub disabled: bool,
}

impl DoorState {
    fn new(name: String, now: DateTime<Utc>) -> Self {
        Self {
            name,
            closed: false,
            last_change: now,
            disabled: false,
        }
    }

    /// Stores an observed value; returns true when it was a transition
    pub fn observe(&mut self, closed: bool, now: DateTime<Utc>) -> bool {
        if self.closed == closed {
            return false;
        }
        self.closed = closed;
        self.last_change = now;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    doors: [DoorState; 2],
    pub temperature_celsius: f64,
    pub last_refresh: DateTime<Utc>,
}

impl RoomState {
    pub fn new(
        door1_name: impl Into<String>,
        door2_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            doors: [
                DoorState::new(door1_name.into(), now),
                DoorState::new(door2_name.into(), now),
            ],
            temperature_celsius: 0.0,
            last_refresh: now,
        }
    }

    pub fn door(&self, id: DoorId) -> &DoorState {
        &self.doors[id.slot()]
    }

    pub fn door_mut(&mut self, id: DoorId) -> &mut DoorState {
        &mut self.doors[id.slot()]
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let door1 = self.door(DoorId::One);
        let door2 = self.door(DoorId::Two);
        RoomSnapshot {
            door1_name: door1.name.clone(),
            door1_closed: door1.closed,
            door2_name: door2.name.clone(),
            door2_closed: door2.closed,
            temperature: self.temperature_celsius,
            last_read: self.last_refresh,
            door1_status_time: door1.last_change,
            door2_status_time: door2.last_change,
        }
    }
}

/// Read-only copy of the room served to the query surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    #[serde(rename = "door1name")]
    pub door1_name: String,
    #[serde(rename = "door1closed")]
    pub door1_closed: bool,
    #[serde(rename = "door2name")]
    pub door2_name: String,
    #[serde(rename = "door2closed")]
    pub door2_closed: bool,
    #[serde(rename = "temp")]
    pub temperature: f64,
    #[serde(rename = "lastread")]
    pub last_read: DateTime<Utc>,
    #[serde(rename = "door1statustime")]
    pub door1_status_time: DateTime<Utc>,
    #[serde(rename = "door2statustime")]
    pub door2_status_time: DateTime<Utc>,
}

impl RoomSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
