//! Engine actor
//!
//! One task owns the [`RoomState`] and every component that reads or writes
//! it. Ticks and inbound messages are served from a single `select!` loop, so
//! they never overlap. Readers get snapshots over a `watch` channel through a
//! cloneable [`RoomHandle`].

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alarm::{Alert, DoorAlarmNotifier};
use crate::command::{CommandHandler, CommandOutcome, DoorCommand};
use crate::error::{EngineError, SensorError};
use crate::room::{DoorId, RoomSnapshot, RoomState};
use crate::sensors::SensorGateway;
use crate::telemetry::{PublishReport, TelemetryPublisher};

pub const CHANNEL_CAPACITY: usize = 32;

macro_rules! respond {
    ($result:expr, $response_tx:expr) => {
        if $response_tx.send($result).is_err() {
            warn!("Requester went away before the response was sent");
        }
    };
}

#[derive(Debug)]
pub enum EngineMessage {
    Command(DoorCommand),
    /// Broker session (re)connected; commands are held back again
    BrokerConnected,
    SubscriptionFailed(DoorId),
    Refresh {
        response_tx: oneshot::Sender<Result<RoomSnapshot, EngineError>>,
    },
    Actuate {
        door: DoorId,
        response_tx: oneshot::Sender<Result<(), EngineError>>,
    },
}

pub fn channel() -> (mpsc::Sender<EngineMessage>, mpsc::Receiver<EngineMessage>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// What one tick did
#[derive(Debug)]
pub struct TickReport {
    pub sensors: Result<(), SensorError>,
    pub alerts: Vec<Alert>,
    pub publish: PublishReport,
}

pub struct Engine {
    room: RoomState,
    gateway: SensorGateway,
    notifier: DoorAlarmNotifier,
    publisher: TelemetryPublisher,
    commands: CommandHandler,
    snapshot_tx: watch::Sender<RoomSnapshot>,
}

impl Engine {
    pub fn new(
        room: RoomState,
        gateway: SensorGateway,
        notifier: DoorAlarmNotifier,
        publisher: TelemetryPublisher,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(room.snapshot());
        Self {
            room,
            gateway,
            notifier,
            publisher,
            commands: CommandHandler::new(),
            snapshot_tx,
        }
    }

    pub fn room(&self) -> &RoomState {
        &self.room
    }

    pub fn commands(&self) -> &CommandHandler {
        &self.commands
    }

    /// Refresh, evaluate alarms, then publish
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        debug!("Tick at {}", now);
        let sensors = self.gateway.refresh(&mut self.room, now).await;
        let alerts = self.notifier.evaluate(&self.room, now).await;
        let publish = self.publisher.publish(&self.room, now).await;

        if publish.mqtt.all_published() {
            self.commands.release_guard();
        }
        self.publish_snapshot();

        TickReport {
            sensors,
            alerts,
            publish,
        }
    }

    pub async fn handle_message(&mut self, message: EngineMessage, now: DateTime<Utc>) {
        match message {
            EngineMessage::Command(command) => {
                let outcome = self
                    .commands
                    .handle(&command, &self.room, &self.gateway)
                    .await;
                match outcome {
                    CommandOutcome::Failed(e) => {
                        error!("Command for {} failed: {}", command.door, e)
                    }
                    other => debug!("Command for {}: {:?}", command.door, other),
                }
            }
            EngineMessage::BrokerConnected => self.commands.arm_guard(),
            EngineMessage::SubscriptionFailed(door) => self.commands.mark_intake_dead(door),
            EngineMessage::Refresh { response_tx } => {
                let result = self
                    .gateway
                    .refresh(&mut self.room, now)
                    .await
                    .map(|_| self.room.snapshot())
                    .map_err(EngineError::from);
                respond!(result, response_tx);
            }
            EngineMessage::Actuate { door, response_tx } => {
                let result = self.gateway.actuate(door).await.map_err(EngineError::from);
                respond!(result, response_tx);
            }
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.room.snapshot());
    }

    /// Moves the engine onto its own task
    ///
    /// `tx` is the sending half of `rx`; the returned handle keeps a clone of
    /// it. The loop ends when `cancel` fires or every sender is gone.
    pub fn spawn(
        self,
        tx: mpsc::Sender<EngineMessage>,
        rx: mpsc::Receiver<EngineMessage>,
        tick: Duration,
        cancel: CancellationToken,
    ) -> (RoomHandle, JoinHandle<()>) {
        let handle = RoomHandle {
            tx,
            snapshot_rx: self.snapshot_tx.subscribe(),
        };
        let task = tokio::spawn(self.run(rx, tick, cancel));
        (handle, task)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineMessage>,
        tick: Duration,
        cancel: CancellationToken,
    ) {
        info!("Monitoring every {:?}", tick);
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Engine shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick(Utc::now()).await;
                    debug!(
                        "Tick done: sensors ok = {}, {} alert(s), {:?}",
                        report.sensors.is_ok(),
                        report.alerts.len(),
                        report.publish
                    );
                }
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(message, Utc::now()).await,
                    None => {
                        info!("All engine senders dropped");
                        break;
                    }
                }
            }
        }
    }
}

/// Cloneable access to a running engine
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<EngineMessage>,
    snapshot_rx: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    /// The room as of the last tick or handled message
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Re-reads the sensors right away and returns the fresh snapshot
    pub async fn refresh_now(&self) -> Result<RoomSnapshot, EngineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(EngineMessage::Refresh { response_tx }).await?;
        response_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn actuate(&self, door: DoorId) -> Result<(), EngineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(EngineMessage::Actuate { door, response_tx })
            .await?;
        response_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn request(&self, message: EngineMessage) -> Result<(), EngineError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}
