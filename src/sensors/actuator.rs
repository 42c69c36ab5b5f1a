//! Door relay actuators
//!
//! Two ways of pulsing the garage door opener:
//! - [`ScriptActuator`] runs the relay helper script with the door number,
//!   exactly like the door watcher deployment expects.
//! - [`GpioRelayActuator`] drives the relay pins directly through `rppal`.

use async_trait::async_trait;
use rppal::gpio::Gpio;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::Actuator;
use crate::error::ActuationError;
use crate::room::DoorId;

pub struct ScriptActuator {
    interpreter: String,
    script: PathBuf,
}

impl ScriptActuator {
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }
}

#[async_trait]
impl Actuator for ScriptActuator {
    async fn actuate(&self, door: DoorId) -> Result<String, ActuationError> {
        if !tokio::fs::try_exists(&self.script).await.unwrap_or(false) {
            return Err(ActuationError::ActuatorUnavailable(format!(
                "File {} does not exist",
                self.script.display()
            )));
        }

        debug!(
            "Running {} {} {}",
            self.interpreter,
            self.script.display(),
            door.number()
        );
        let output = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(door.number().to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ActuationError::ActuatorUnavailable(format!(
                    "Failed to start {}: {}",
                    self.interpreter, e
                ))
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(ActuationError::ActuatorFailed { output: combined })
        }
    }
}

pub struct GpioRelayActuator {
    pins: [u8; 2],
    pulse: Duration,
}

impl GpioRelayActuator {
    pub fn new(door1_pin: u8, door2_pin: u8, pulse: Duration) -> Self {
        Self {
            pins: [door1_pin, door2_pin],
            pulse,
        }
    }

    pub fn pin_for(&self, door: DoorId) -> u8 {
        self.pins[door.number() as usize - 1]
    }
}

#[async_trait]
impl Actuator for GpioRelayActuator {
    async fn actuate(&self, door: DoorId) -> Result<String, ActuationError> {
        let pin_number = self.pin_for(door);
        let pulse = self.pulse;
        info!("Pulsing relay on GPIO {} for {:?}", pin_number, pulse);

        tokio::task::spawn_blocking(move || {
            let gpio = Gpio::new().map_err(|e| {
                ActuationError::ActuatorUnavailable(format!("GPIO not available: {}", e))
            })?;
            let mut pin = gpio
                .get(pin_number)
                .map_err(|e| {
                    ActuationError::ActuatorUnavailable(format!("GPIO {}: {}", pin_number, e))
                })?
                .into_output_low();

            pin.set_high();
            std::thread::sleep(pulse);
            pin.set_low();
            Ok(format!("pulsed GPIO {}", pin_number))
        })
        .await
        .map_err(|e| ActuationError::ActuatorFailed {
            output: format!("relay task panicked: {}", e),
        })?
    }
}
