//! Door-open-too-long alarm
//!
//! Each door runs a two-state machine:
//!
//! ```text
//!            open ≥ period / "open for N minutes"
//!   Quiet ─────────────────────────────────────► Alerting
//!     ▲                                             │
//!     └──────────── closed / "now closed" ──────────┘
//! ```
//!
//! One alert per open episode, one closed notice per alerted episode. A failed
//! send is logged and the machine moves on anyway; the alert is not retried.

pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::error::AlertSendError;
use crate::room::{DoorId, DoorState, RoomState};

pub use telegram::TelegramSender;

#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), AlertSendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmState {
    #[default]
    Quiet,
    Alerting,
}

/// Per-door alarm memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmMemory {
    pub state: AlarmState,
    /// `last_change` of the open episode that raised the alert
    pub episode_start: Option<DateTime<Utc>>,
}

impl AlarmMemory {
    pub fn alerting(&self) -> bool {
        self.state == AlarmState::Alerting
    }
}

/// An alert the notifier tried to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    OpenTooLong { door: DoorId, text: String },
    NowClosed { door: DoorId, text: String },
}

impl Alert {
    pub fn text(&self) -> &str {
        match self {
            Alert::OpenTooLong { text, .. } | Alert::NowClosed { text, .. } => text,
        }
    }
}

pub fn open_too_long_text(name: &str, minutes: i64) -> String {
    format!("{}'s door has been open for {} minutes.", name, minutes)
}

pub fn now_closed_text(name: &str) -> String {
    format!("{}'s door is now closed.", name)
}

pub struct DoorAlarmNotifier {
    sender: Option<Box<dyn AlertSender>>,
    period: Duration,
    memory: [AlarmMemory; 2],
}

impl DoorAlarmNotifier {
    /// `sender` is `None` when alarms are switched off
    pub fn new(sender: Option<Box<dyn AlertSender>>, period: Duration) -> Self {
        Self {
            sender,
            period,
            memory: Default::default(),
        }
    }

    pub fn memory(&self, door: DoorId) -> &AlarmMemory {
        &self.memory[door.number() as usize - 1]
    }

    /// Runs every door's state machine against the current room
    pub async fn evaluate(&mut self, room: &RoomState, now: DateTime<Utc>) -> Vec<Alert> {
        if self.sender.is_none() {
            return Vec::new();
        }

        let mut alerts = Vec::new();
        for door in DoorId::ALL {
            let state = room.door(door);
            if state.disabled {
                debug!("{} is disabled", door);
                continue;
            }

            let slot = door.number() as usize - 1;
            for alert in step(&mut self.memory[slot], door, state, self.period, now) {
                self.deliver(&alert).await;
                alerts.push(alert);
            }
        }
        alerts
    }

    async fn deliver(&self, alert: &Alert) {
        let Some(sender) = &self.sender else {
            return;
        };
        info!("Sending alert: {}", alert.text());
        if let Err(e) = sender.send(alert.text()).await {
            error!("Error sending alert {:?}: {}", alert.text(), e);
        }
    }
}

/// Advances one door's machine and returns the alerts to send, in order
fn step(
    memory: &mut AlarmMemory,
    door: DoorId,
    state: &DoorState,
    period: Duration,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if state.closed {
        if memory.alerting() {
            alerts.push(Alert::NowClosed {
                door,
                text: now_closed_text(&state.name),
            });
            *memory = AlarmMemory::default();
        }
        return alerts;
    }

    // closed and reopened between two ticks: the alerted episode is over
    if memory.alerting() && memory.episode_start != Some(state.last_change) {
        alerts.push(Alert::NowClosed {
            door,
            text: now_closed_text(&state.name),
        });
        *memory = AlarmMemory::default();
    }

    let elapsed = now - state.last_change;
    debug!("{} open for {} minutes", door, elapsed.num_minutes());
    if !memory.alerting() && elapsed >= period {
        alerts.push(Alert::OpenTooLong {
            door,
            text: open_too_long_text(&state.name, elapsed.num_minutes()),
        });
        memory.state = AlarmState::Alerting;
        memory.episode_start = Some(state.last_change);
    }
    alerts
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every message; optionally fails each send
    #[derive(Clone, Default)]
    pub struct RecordingSender {
        pub sent: Arc<Mutex<Vec<String>>>,
        pub fail: Arc<Mutex<bool>>,
    }

    impl RecordingSender {
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    #[async_trait]
    impl AlertSender for RecordingSender {
        async fn send(&self, text: &str) -> Result<(), AlertSendError> {
            self.sent.lock().unwrap().push(text.to_string());
            if *self.fail.lock().unwrap() {
                Err(AlertSendError::Transport("offline".to_string()))
            } else {
                Ok(())
            }
        }
    }
}
