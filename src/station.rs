// CLASSIFICATION: COMMUNITY
// Filename: station.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Session runner for one bench.
//!
//! The network loop runs on the calling thread and hands every inbound
//! message to the [`Router`]; the watchdog runs on its own thread. Once a
//! terminal step has been applied the session closes the telemetry log,
//! optionally keeps the link polled for the settle delay so queued
//! publishes reach the broker, disconnects and returns exit code 0.

use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::bus::{topics, Bus, BusError, Delivery, Link, LinkEvent, MqttLink};
use crate::config::StationConfig;
use crate::lifecycle::Terminal;
use crate::probe::ProcessProbe;
use crate::router::Router;
use crate::store::StoreError;
use crate::watchdog::{Watchdog, WatchdogHandle};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("startup failed: {0}")]
    Store(#[from] StoreError),
    #[error("broker unreachable: {0}")]
    Bus(#[from] BusError),
    #[error("broker refused connection: {0}")]
    Refused(String),
}

/// One running control process.
pub struct Session {
    config: StationConfig,
    router: Router,
    link: Box<dyn Link>,
    watchdog: Option<WatchdogHandle>,
    connected_once: bool,
}

impl Session {
    /// Run the startup sequence and start the watchdog. The broker is
    /// contacted on the first poll of [`Session::run`].
    pub fn start(config: StationConfig, station: &str, serial: &str) -> Result<Self, SessionError> {
        let (mqtt, link) = MqttLink::open(&config, station);
        let bus: Arc<dyn Bus> = Arc::new(mqtt);
        let probe = Box::new(ProcessProbe::new(config.station.printer_process.clone()));
        let router = Router::prepare(&config, station, serial, bus, probe)?;
        Ok(Self::assemble(config, router, Box::new(link)))
    }

    /// Wire a prepared router to `link`, arm the baseline and start the
    /// watchdog on the router's bus.
    pub fn assemble(config: StationConfig, router: Router, link: Box<dyn Link>) -> Self {
        router.baseline().touch();
        let watchdog = Watchdog::new(
            router.station(),
            router.baseline().clone(),
            config.watchdog_timeout(),
            config.watchdog_interval(),
            Arc::clone(router.bus()),
        )
        .spawn();

        Self {
            config,
            router,
            link,
            watchdog: Some(watchdog),
            connected_once: false,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn watchdog_running(&self) -> bool {
        self.watchdog.as_ref().map_or(false, WatchdogHandle::is_running)
    }

    /// Drive the network loop until a terminal step. Returns the exit code.
    pub fn run(&mut self) -> Result<i32, SessionError> {
        info!(
            "{}: connecting to {}:{}",
            self.router.station(),
            self.config.bus.host,
            self.config.bus.port
        );
        loop {
            match self.link.poll(POLL_INTERVAL) {
                Ok(LinkEvent::Connected) => self.on_connected(),
                Ok(LinkEvent::Refused(code)) => {
                    if !self.connected_once {
                        return Err(SessionError::Refused(code));
                    }
                    error!("{}: reconnect refused: {code}", self.router.station());
                    thread::sleep(RETRY_DELAY);
                }
                Ok(LinkEvent::Message { topic, payload }) => {
                    if let Some(terminal) = self.router.dispatch(&topic, &payload) {
                        return Ok(self.shutdown(terminal));
                    }
                }
                Ok(LinkEvent::Closed) => {
                    error!("{}: bus link closed", self.router.station());
                    return Err(SessionError::Bus(BusError::Disconnected));
                }
                Ok(LinkEvent::Idle) => {}
                Err(e) => {
                    if !self.connected_once {
                        return Err(e.into());
                    }
                    warn!("{}: {e}; retrying", self.router.station());
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    fn on_connected(&mut self) {
        let station = self.router.station().to_string();
        info!("{station}: connected to broker");
        for topic in topics::inbound(&station) {
            match self.link.subscribe(&topic, Delivery::AtMostOnce) {
                Ok(()) => debug!("{station}: subscribed to {topic}"),
                Err(e) => error!("{station}: subscribe {topic} failed: {e}"),
            }
        }
        if self.connected_once {
            return;
        }
        self.connected_once = true;
        self.announce(&station);
    }

    /// Publish the startup command with the recorded step and capacity.
    fn announce(&self, station: &str) {
        let record = match self.router.records().load() {
            Ok(record) => record,
            Err(e) => {
                error!("{station}: startup command not sent: {e}");
                return;
            }
        };
        let payload = json!({
            "current_step": record.current_step,
            "capacity_ah": record.capacity_ah,
            "capacity_wh": record.capacity_wh,
        })
        .to_string();
        let topic = topics::command(station);
        match self
            .router
            .bus()
            .publish(&topic, payload.as_bytes(), Delivery::AtLeastOnce)
        {
            Ok(()) => info!("{station}: startup command {payload} sent on {topic}"),
            Err(e) => error!("{station}: startup command not sent: {e}"),
        }
    }

    /// Common exit sequence for every terminal step.
    fn shutdown(&mut self, terminal: Terminal) -> i32 {
        let station = self.router.station().to_string();
        self.router.close_log();

        if terminal.effects.settle {
            let settle = self.config.settle_delay();
            info!("{station}: settling {:.1}s before disconnect", settle.as_secs_f64());
            self.drain(settle, false);
        }

        if terminal.effects.disconnect {
            let requested = self.router.bus().disconnect();
            match requested {
                Ok(()) => self.drain(DISCONNECT_GRACE, true),
                Err(e) => error!("{station}: disconnect failed: {e}"),
            }
        }

        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        info!("{station}: exiting after {}", terminal.step);
        0
    }

    /// Keep the link polled for up to `window`. Inbound messages are dropped.
    fn drain(&mut self, window: Duration, until_closed: bool) {
        let deadline = Instant::now() + window;
        loop {
            let now = Instant::now();
            if now >= deadline {
                if until_closed {
                    warn!("{}: disconnect not confirmed", self.router.station());
                }
                return;
            }
            match self.link.poll(deadline - now) {
                Ok(LinkEvent::Closed) => return,
                Ok(LinkEvent::Message { topic, .. }) => {
                    debug!("{}: {topic} dropped during shutdown", self.router.station());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("{}: link error during shutdown: {e}", self.router.station());
                    return;
                }
            }
        }
    }
}
