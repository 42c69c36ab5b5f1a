//! # MQTT Integration Module
//!
//! Connects the garage to a home-automation broker. Outbound, the telemetry
//! publisher pushes retained door and temperature state through
//! [`mqtt_handler::MqttBroker`]. Inbound, door set commands arrive on the
//! session's event loop and are forwarded to the engine task as messages.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, credentials and topic layout
//! ├── message_manager.rs  - Inbound message representation and command parsing
//! └── mqtt_handler.rs     - Session state machine, event loop and broker adapter
//! ```
//!
//! ## Topics
//!
//! With the default prefix `home/garage`:
//!
//! | Topic                     | Direction | Payload            |
//! |---------------------------|-----------|--------------------|
//! | `home/garage/door1`       | out, retained | `ON` closed / `OFF` open |
//! | `home/garage/door2`       | out, retained | `ON` / `OFF`       |
//! | `home/garage/temperature` | out, retained | `21.5`             |
//! | `home/garage/door1/set`   | in        | `ON` close / `OFF` open |
//! | `home/garage/door2/set`   | in        | `ON` / `OFF`       |
//!
//! ## Connection Handling
//!
//! Reconnection is left to rumqttc: after a connection error the event loop is
//! polled again after a short back-off. Every CONNACK re-arms the command guard
//! and re-subscribes, since the session is not persistent on the broker.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
