// CLASSIFICATION: COMMUNITY
// Filename: router.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Inbound message demultiplexer.
//!
//! The [`Router`] owns the per-test state of one bench and routes each
//! inbound message to the step, telemetry or results handler depending on
//! the topic suffix after the first `/`. Messages are handled one at a time
//! in arrival order.

use log::{error, info, warn};
use std::sync::Arc;

use crate::bus::{topics, Bus};
use crate::config::StationConfig;
use crate::lifecycle::{Lifecycle, Step, StepContext, Terminal, Transition};
use crate::probe::ServiceProbe;
use crate::results;
use crate::store::{DataLayout, RecordStore, RegistryStore, StoreError};
use crate::telemetry::log::TelemetryLog;
use crate::telemetry::TelemetryHandler;
use crate::watchdog::Baseline;

/// Handler selected for a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Step,
    BmsData,
    RiResults,
    Unknown,
}

/// Pick the handler for `topic` from the part after the first `/`.
pub fn route(topic: &str) -> Route {
    match topic.split_once('/').map(|(_, suffix)| suffix) {
        Some(topics::STEP) => Route::Step,
        Some(topics::BMS_DATA) => Route::BmsData,
        Some(topics::RI_RESULTS) => Route::RiResults,
        _ => Route::Unknown,
    }
}

/// Per-test state and the handlers operating on it.
pub struct Router {
    station: String,
    serial: String,
    lifecycle: Lifecycle,
    log: TelemetryLog,
    records: RecordStore,
    registry: RegistryStore,
    layout: DataLayout,
    baseline: Baseline,
    telemetry: TelemetryHandler,
    probe: Box<dyn ServiceProbe>,
    bus: Arc<dyn Bus>,
}

impl Router {
    /// Run the startup sequence for `station` / `serial`.
    ///
    /// Loads or creates the test record and its telemetry log, makes sure
    /// the fleet registry exists and opens the log for appending. Only a
    /// failure to create the test directory or the record is fatal.
    pub fn prepare(
        config: &StationConfig,
        station: &str,
        serial: &str,
        bus: Arc<dyn Bus>,
        probe: Box<dyn ServiceProbe>,
    ) -> Result<Self, StoreError> {
        let layout = DataLayout::new(&config.paths.data_root, &config.paths.archive_root);
        let cell_count = config.station.cell_count;
        let (records, record) = RecordStore::load_or_create(&layout, station, serial, cell_count)?;

        let registry = RegistryStore::new(&config.paths.registry);
        if let Err(e) = registry.load_or_create(&config.station.valid) {
            error!("{station}: fleet registry unavailable: {e}");
        }

        let log = match TelemetryLog::open_append(records.dir()) {
            Ok(log) => log,
            Err(e) => {
                error!("{station}: telemetry log not opened: {e}");
                TelemetryLog::closed(records.dir().join(crate::store::layout::TELEMETRY_FILE))
            }
        };

        let step = Step::from_code(record.current_step).unwrap_or_else(|| {
            warn!(
                "{station}: record holds unknown step {}; starting at 1",
                record.current_step
            );
            Step::PhaseRi
        });
        info!(
            "{station}: test {} in {} at step {step}",
            record.serial,
            records.dir().display()
        );

        Ok(Self {
            station: station.into(),
            serial: serial.into(),
            lifecycle: Lifecycle::new(step, config.station.enforce_monotonic_steps),
            log,
            records,
            registry,
            layout,
            baseline: Baseline::new(),
            telemetry: TelemetryHandler::new(station, cell_count),
            probe,
            bus,
        })
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn step(&self) -> Step {
        self.lifecycle.current()
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn log(&self) -> &TelemetryLog {
        &self.log
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn close_log(&mut self) {
        self.log.close();
    }

    /// Handle one inbound message. Returns the terminal marker once a
    /// terminal step has been applied.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> Option<Terminal> {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                error!("{}: non UTF-8 payload on {topic}: {e}", self.station);
                return None;
            }
        };

        match route(topic) {
            Route::Step => {
                let mut ctx = StepContext {
                    station: &self.station,
                    serial: &self.serial,
                    records: &mut self.records,
                    registry: &self.registry,
                    layout: &self.layout,
                    log: &mut self.log,
                    bus: self.bus.as_ref(),
                    probe: self.probe.as_ref(),
                };
                match self.lifecycle.handle(text, &mut ctx) {
                    Transition::Terminal(terminal) => Some(terminal),
                    Transition::Advanced(_) | Transition::Ignored => None,
                }
            }
            Route::BmsData => {
                self.telemetry.handle(
                    text,
                    self.lifecycle.current(),
                    &mut self.log,
                    &self.records,
                    &self.baseline,
                );
                None
            }
            Route::RiResults => {
                results::handle(text, &self.station, &self.records);
                None
            }
            Route::Unknown => {
                warn!("{}: unhandled topic {topic}", self.station);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_on_suffix() {
        assert_eq!(route("banc1/step"), Route::Step);
        assert_eq!(route("banc3/bms/data"), Route::BmsData);
        assert_eq!(route("banc2/ri/results"), Route::RiResults);
        assert_eq!(route("banc1/security"), Route::Unknown);
        assert_eq!(route("step"), Route::Unknown);
    }
}
