//! Inbound door commands
//!
//! Commands are only acted on once the broker session has settled: the guard
//! is armed on every connect so retained `set` messages replayed by the broker
//! cannot move a door, and released after the first telemetry round in which
//! every topic was published.

use tracing::{debug, error, info, warn};

use crate::error::ActuationError;
use crate::room::{DoorId, RoomState};
use crate::sensors::SensorGateway;

/// A `set` message for one door
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorCommand {
    pub door: DoorId,
    pub payload: String,
}

impl DoorCommand {
    /// The requested `closed` value, if the payload is understood
    pub fn requested_closed(&self) -> Option<bool> {
        match self.payload.as_str() {
            "ON" => Some(true),
            "OFF" => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ignored(IgnoreReason),
    /// The door is already where it was asked to be
    NoOp,
    Actuated,
    Failed(ActuationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Guard,
    DeadIntake,
    UnknownPayload,
}

pub struct CommandHandler {
    ignore_commands: bool,
    dead_intake: [bool; 2],
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler {
    pub fn new() -> Self {
        Self {
            ignore_commands: true,
            dead_intake: [false; 2],
        }
    }

    pub fn ignoring(&self) -> bool {
        self.ignore_commands
    }

    pub fn arm_guard(&mut self) {
        if !self.ignore_commands {
            info!("Ignoring door commands until telemetry is published");
        }
        self.ignore_commands = true;
    }

    pub fn release_guard(&mut self) {
        if self.ignore_commands {
            info!("Accepting door commands");
        }
        self.ignore_commands = false;
    }

    /// Stops accepting commands for `door` until restart
    pub fn mark_intake_dead(&mut self, door: DoorId) {
        error!("Command intake for {} is down until restart", door);
        self.dead_intake[door.number() as usize - 1] = true;
    }

    pub fn intake_dead(&self, door: DoorId) -> bool {
        self.dead_intake[door.number() as usize - 1]
    }

    pub async fn handle(
        &self,
        command: &DoorCommand,
        room: &RoomState,
        gateway: &SensorGateway,
    ) -> CommandOutcome {
        if self.ignore_commands {
            debug!("Ignoring {} command while starting up", command.door);
            return CommandOutcome::Ignored(IgnoreReason::Guard);
        }
        if self.intake_dead(command.door) {
            debug!("Dropping command for {}", command.door);
            return CommandOutcome::Ignored(IgnoreReason::DeadIntake);
        }

        let Some(requested_closed) = command.requested_closed() else {
            warn!(
                "Unknown payload {:?} for {}, ignoring",
                command.payload, command.door
            );
            return CommandOutcome::Ignored(IgnoreReason::UnknownPayload);
        };

        if room.door(command.door).closed == requested_closed {
            debug!("{} already in requested state", command.door);
            return CommandOutcome::NoOp;
        }

        match gateway.actuate(command.door).await {
            Ok(()) => CommandOutcome::Actuated,
            Err(e) => CommandOutcome::Failed(e),
        }
    }
}
