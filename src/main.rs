pub mod alarm;
pub mod command;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod room;
pub mod scheduler;
pub mod sensors;
pub mod telemetry;

use chrono::Utc;
use color_eyre::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::alarm::{AlertSender, DoorAlarmNotifier, TelegramSender};
use crate::config::{ActuatorConfig, ActuatorKind, Config};
use crate::mqtt::config::MqttConfig;
use crate::mqtt::mqtt_handler::{Configured, MqttSession};
use crate::room::RoomState;
use crate::scheduler::{Engine, EngineMessage};
use crate::sensors::{
    Actuator, FileDoorSource, GpioRelayActuator, OneWireProbe, ScriptActuator, SensorGateway,
};
use crate::telemetry::{CloudSink, MqttSink, TelemetryPublisher};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(&Config::locate()).await?;
    setup(config.verbose)?;
    debug!("Running with {:?}", config);

    let room = RoomState::new(
        config.doors.door1_name.clone(),
        config.doors.door2_name.clone(),
        Utc::now(),
    );
    let gateway = SensorGateway::new(
        Box::new(OneWireProbe::new(config.probe.devices_dir.clone())),
        Box::new(FileDoorSource::new(config.data_dir.clone())),
        build_actuator(&config.actuator),
        config.doors.enable_door1,
        config.doors.enable_door2,
    );
    let notifier =
        DoorAlarmNotifier::new(build_alert_sender(&config), config.alarm.effective_period());

    let cancel = CancellationToken::new();
    let (tx, rx) = scheduler::channel();
    let (session, mqtt_sink) = match build_mqtt(&config, tx.clone()) {
        Some((session, sink)) => (Some(session), Some(sink)),
        None => (None, None),
    };
    let publisher = TelemetryPublisher::new(build_cloud_sink(&config), mqtt_sink);

    let engine = Engine::new(room, gateway, notifier, publisher);
    let (handle, engine_task) = engine.spawn(tx, rx, config.tick(), cancel.clone());

    let session_task = session.map(|session| tokio::spawn(session.start().run(cancel.clone())));

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down");
    cancel.cancel();

    if let Some(task) = session_task {
        if let Err(e) = task.await {
            error!("MQTT session task failed: {}", e);
        }
    }
    if let Err(e) = engine_task.await {
        error!("Engine task failed: {}", e);
    }

    match handle.snapshot().to_json() {
        Ok(json) => info!("Last known state: {}", json),
        Err(e) => warn!("Unable to serialize last state: {}", e),
    }
    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn build_actuator(config: &ActuatorConfig) -> Box<dyn Actuator> {
    match config.kind {
        ActuatorKind::Script => {
            info!(
                "Using relay script {} {}",
                config.interpreter,
                config.script.display()
            );
            Box::new(ScriptActuator::new(
                config.interpreter.clone(),
                config.script.clone(),
            ))
        }
        ActuatorKind::Gpio => {
            info!(
                "Using GPIO relays on pins {} and {}",
                config.door1_pin, config.door2_pin
            );
            Box::new(GpioRelayActuator::new(
                config.door1_pin,
                config.door2_pin,
                Duration::from_millis(config.pulse_ms),
            ))
        }
    }
}

fn build_alert_sender(config: &Config) -> Option<Box<dyn AlertSender>> {
    if !config.alarm.enabled {
        info!("Door alarm is disabled");
        return None;
    }
    match TelegramSender::from_config(&config.telegram) {
        Ok(sender) => Some(Box::new(sender)),
        Err(e) => {
            warn!("{}. Door alarm is disabled", e);
            None
        }
    }
}

fn build_cloud_sink(config: &Config) -> Option<CloudSink> {
    if !config.cloud.enabled {
        info!("Cloud dashboard is disabled");
        return None;
    }
    match CloudSink::from_config(&config.cloud) {
        Ok(sink) => Some(sink),
        Err(e) => {
            warn!("{}. Cloud dashboard is disabled", e);
            None
        }
    }
}

fn build_mqtt(
    config: &Config,
    engine_tx: mpsc::Sender<EngineMessage>,
) -> Option<(MqttSession<Configured>, MqttSink)> {
    if !config.mqtt.enabled {
        info!("MQTT is disabled");
        return None;
    }
    if let Err(e) = config.mqtt.validate() {
        warn!("{}. MQTT is disabled", e);
        return None;
    }
    let mqtt_config = match MqttConfig::from_broker_config(&config.mqtt) {
        Ok(mqtt_config) => mqtt_config,
        Err(e) => {
            error!("{}. MQTT is disabled", e);
            return None;
        }
    };

    let topics = mqtt_config.topics.clone();
    let (session, broker) = MqttSession::create(mqtt_config, engine_tx);
    Some((session, MqttSink::new(Box::new(broker), topics)))
}
