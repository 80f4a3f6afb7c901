// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Message bus seam.
//!
//! Handlers only ever publish, unsubscribe and disconnect, so they talk to a
//! [`Bus`] trait object. [`mqtt::MqttBus`] implements it on top of the
//! broker connection; [`RecordingBus`] keeps everything in memory for tests
//! and dry runs. The session loop drives the inbound side through [`Link`].

pub mod mqtt;

use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

pub use mqtt::{MqttBus, MqttLink};

/// Topic names used by a bench control process.
pub mod topics {
    pub const STEP: &str = "step";
    pub const BMS_DATA: &str = "bms/data";
    pub const RI_RESULTS: &str = "ri/results";
    pub const PRINTER_TEST_DONE: &str = "printer/test_done";

    pub fn scoped(station: &str, suffix: &str) -> String {
        format!("{station}/{suffix}")
    }

    pub fn security(station: &str) -> String {
        scoped(station, "security")
    }

    pub fn command(station: &str) -> String {
        scoped(station, "command")
    }

    pub fn bms_data(station: &str) -> String {
        scoped(station, BMS_DATA)
    }

    /// Inbound topics a control process subscribes to.
    pub fn inbound(station: &str) -> [String; 3] {
        [
            scoped(station, STEP),
            scoped(station, BMS_DATA),
            scoped(station, RI_RESULTS),
        ]
    }
}

/// Delivery guarantee requested for a publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    AtMostOnce,
    AtLeastOnce,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("bus connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("bus is disconnected")]
    Disconnected,
}

/// Outbound half of the bus as seen by handlers and the watchdog.
pub trait Bus: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8], delivery: Delivery) -> Result<(), BusError>;
    fn unsubscribe(&self, topic: &str) -> Result<(), BusError>;
    fn disconnect(&self) -> Result<(), BusError>;
}

/// What the network loop observed during one poll.
#[derive(Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker accepted the connection.
    Connected,
    /// Broker refused the connection.
    Refused(String),
    /// Application message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// Disconnect has been written; the link is finished.
    Closed,
    /// Nothing relevant within the poll window.
    Idle,
}

/// Inbound half of the bus, polled by the session loop.
pub trait Link {
    /// Wait up to `timeout` for the next event.
    fn poll(&mut self, timeout: Duration) -> Result<LinkEvent, BusError>;
    fn subscribe(&self, topic: &str, delivery: Delivery) -> Result<(), BusError>;
}

/// Something the in-memory bus was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusAction {
    Publish {
        topic: String,
        payload: String,
        delivery: Delivery,
    },
    Unsubscribe(String),
    Disconnect,
}

/// In-memory [`Bus`] that records every request.
#[derive(Debug, Default)]
pub struct RecordingBus {
    actions: Mutex<Vec<BusAction>>,
    disconnected: Mutex<bool>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<BusAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Payloads published on `topic`, in order.
    pub fn published(&self, topic: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                BusAction::Publish {
                    topic: t, payload, ..
                } if t == topic => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.lock().map(|d| *d).unwrap_or(false)
    }

    fn record(&self, action: BusAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }
}

impl Bus for RecordingBus {
    fn publish(&self, topic: &str, payload: &[u8], delivery: Delivery) -> Result<(), BusError> {
        if self.is_disconnected() {
            return Err(BusError::Disconnected);
        }
        self.record(BusAction::Publish {
            topic: topic.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            delivery,
        });
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        if self.is_disconnected() {
            return Err(BusError::Disconnected);
        }
        self.record(BusAction::Unsubscribe(topic.into()));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BusError> {
        if let Ok(mut d) = self.disconnected.lock() {
            *d = true;
        }
        self.record(BusAction::Disconnect);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        assert_eq!(topics::security("banc1"), "banc1/security");
        assert_eq!(topics::inbound("banc2")[1], "banc2/bms/data");
    }

    #[test]
    fn recording_bus_refuses_after_disconnect() {
        let bus = RecordingBus::new();
        bus.publish("a", b"x", Delivery::AtMostOnce).unwrap();
        bus.disconnect().unwrap();
        assert!(bus.publish("a", b"y", Delivery::AtMostOnce).is_err());
        assert_eq!(bus.published("a"), vec!["x".to_string()]);
    }
}
