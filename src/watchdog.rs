// CLASSIFICATION: COMMUNITY
// Filename: watchdog.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Liveness watchdog for the BMS telemetry stream.
//!
//! The telemetry handler refreshes a shared [`Baseline`] on every message.
//! A background thread wakes on a fixed interval and, once the baseline is
//! older than the timeout, clears it and publishes one alert on
//! `{station}/security`. Nothing more is sent until telemetry sets a new
//! baseline, so a stall produces exactly one alert.

use log::{debug, error, info, trace};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::bus::{topics, Bus, Delivery};

/// Time of the latest telemetry arrival, shared with the watchdog thread.
#[derive(Clone, Debug, Default)]
pub struct Baseline {
    inner: Arc<Mutex<Option<Instant>>>,
}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Instant>> {
        // The slot holds a plain Instant, so a poisoned guard is still usable.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, at: Instant) {
        *self.slot() = Some(at);
    }

    pub fn get(&self) -> Option<Instant> {
        *self.slot()
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }

    /// Clear the baseline and report the stall length if it is older than
    /// `timeout` at `now`. Check and clear happen under one lock.
    pub fn expire(&self, now: Instant, timeout: Duration) -> Option<Duration> {
        let mut slot = self.slot();
        let last = (*slot)?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed > timeout {
            *slot = None;
            Some(elapsed)
        } else {
            None
        }
    }
}

/// Stall detector for one station.
pub struct Watchdog {
    station: String,
    baseline: Baseline,
    timeout: Duration,
    interval: Duration,
    bus: Arc<dyn Bus>,
}

impl Watchdog {
    pub fn new(
        station: &str,
        baseline: Baseline,
        timeout: Duration,
        interval: Duration,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            station: station.into(),
            baseline,
            timeout,
            interval,
            bus,
        }
    }

    /// Run one check at `now`. Returns whether an alert was raised.
    pub fn check_at(&self, now: Instant) -> bool {
        let elapsed = match self.baseline.expire(now, self.timeout) {
            Some(elapsed) => elapsed,
            None => {
                trace!("{}: watchdog ok", self.station);
                return false;
            }
        };
        error!(
            "{}: no BMS data for {}s",
            self.station,
            elapsed.as_secs()
        );
        let topic = topics::security(&self.station);
        let payload = format!("Timeout BMS {}", self.station);
        match self.bus.publish(&topic, payload.as_bytes(), Delivery::AtLeastOnce) {
            Ok(()) => info!("{}: timeout alert published on {topic}", self.station),
            Err(e) => error!("{}: timeout alert not published: {e}", self.station),
        }
        true
    }

    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    /// Start the check loop on its own thread.
    pub fn spawn(self) -> WatchdogHandle {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name(format!("watchdog-{}", self.station))
            .spawn(move || {
                info!(
                    "{}: watchdog started (timeout {}s, check every {}s)",
                    self.station,
                    self.timeout.as_secs(),
                    self.interval.as_secs()
                );
                loop {
                    match stop_rx.recv_timeout(self.interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            self.check();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("{}: watchdog stopped", self.station);
            });
        match join {
            Ok(join) => WatchdogHandle {
                stop: Some(stop_tx),
                join: Some(join),
            },
            Err(e) => {
                error!("watchdog thread not started: {e}");
                WatchdogHandle {
                    stop: None,
                    join: None,
                }
            }
        }
    }
}

/// Stops the watchdog thread when dropped.
pub struct WatchdogHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WatchdogHandle {
    pub fn is_running(&self) -> bool {
        self.join.as_ref().map_or(false, |j| !j.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A send error means the thread is already gone; join reports why.
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("watchdog thread panicked");
            }
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_clears_only_after_timeout() {
        let baseline = Baseline::new();
        let t0 = Instant::now();
        baseline.touch_at(t0);
        let timeout = Duration::from_secs(30);

        assert_eq!(baseline.expire(t0 + Duration::from_secs(30), timeout), None);
        assert!(baseline.get().is_some());
        assert_eq!(
            baseline.expire(t0 + Duration::from_secs(31), timeout),
            Some(Duration::from_secs(31))
        );
        assert!(baseline.get().is_none());
        assert_eq!(baseline.expire(t0 + Duration::from_secs(90), timeout), None);
    }

    #[test]
    fn absent_baseline_never_expires() {
        let baseline = Baseline::new();
        assert_eq!(
            baseline.expire(Instant::now(), Duration::from_secs(0)),
            None
        );
    }

    struct FailingBus;

    impl Bus for FailingBus {
        fn publish(&self, _: &str, _: &[u8], _: Delivery) -> Result<(), crate::bus::BusError> {
            panic!("publish exploded");
        }

        fn unsubscribe(&self, _: &str) -> Result<(), crate::bus::BusError> {
            Ok(())
        }

        fn disconnect(&self) -> Result<(), crate::bus::BusError> {
            Ok(())
        }
    }

    #[test]
    fn panicked_thread_is_reaped_on_stop() {
        let baseline = Baseline::new();
        baseline.touch();
        let dog = Watchdog::new(
            "banc1",
            baseline,
            Duration::ZERO,
            Duration::from_millis(5),
            Arc::new(FailingBus),
        );
        let mut handle = dog.spawn();
        thread::sleep(Duration::from_millis(200));
        assert!(!handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
    }
}
