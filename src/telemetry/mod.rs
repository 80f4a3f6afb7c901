// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v1.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! BMS telemetry for a bench.
//!
//! The controller publishes one comma separated line per sample on
//! `{station}/bms/data`. The first ten fields are mandatory:
//!
//! | idx | field |
//! |---|---|
//! | 0 | pack voltage |
//! | 1 | current |
//! | 2 | state of charge |
//! | 3 | temperature |
//! | 4, 5 | max cell index, value |
//! | 6, 7 | min cell index, value |
//! | 8 | cumulative discharged capacity |
//! | 9 | cumulative discharged energy |
//!
//! Optional trailing fields hold the per-cell voltages followed by a
//! heartbeat counter and the averaged auxiliary ("nurse") SOC.

pub mod log;

use ::log::{error, trace, warn};
use chrono::Local;
use std::path::PathBuf;
use thiserror::Error;

use self::log::TelemetryLog;
use crate::lifecycle::Step;
use crate::store::RecordStore;
use crate::watchdog::Baseline;

/// Minimum number of fields in a telemetry line.
pub const MIN_FIELDS: usize = 10;

const CAPACITY_IDX: usize = 8;
const ENERGY_IDX: usize = 9;
const CELLS_IDX: usize = 10;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry payload has {0} fields, at least {MIN_FIELDS} required")]
    TooFewFields(usize),
    #[error("telemetry payload is empty")]
    Empty,
    #[error("telemetry log is closed")]
    Closed,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One parsed telemetry line. Fields are kept verbatim for the log.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryFrame {
    fields: Vec<String>,
}

impl TelemetryFrame {
    pub fn parse(payload: &str) -> Result<Self, TelemetryError> {
        let line = payload.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(TelemetryError::Empty);
        }
        // Controller lines are plain numbers; no field is ever quoted, so a
        // quoted comma splits like any other.
        let fields: Vec<String> = line.split(',').map(str::to_string).collect();
        if fields.len() < MIN_FIELDS {
            return Err(TelemetryError::TooFewFields(fields.len()));
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Finite numeric value of field `idx`; `nan` and `inf` are rejected.
    fn number(&self, idx: usize) -> Option<f64> {
        self.fields
            .get(idx)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    pub fn voltage(&self) -> Option<f64> {
        self.number(0)
    }

    pub fn current(&self) -> Option<f64> {
        self.number(1)
    }

    pub fn soc(&self) -> Option<f64> {
        self.number(2)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.number(3)
    }

    pub fn discharged_capacity(&self) -> Option<f64> {
        self.number(CAPACITY_IDX)
    }

    pub fn discharged_energy(&self) -> Option<f64> {
        self.number(ENERGY_IDX)
    }

    /// Voltage of cell `n` (1-based) in mV, when the line carries it.
    pub fn cell_mv(&self, n: usize, cell_count: usize) -> Option<f64> {
        if n == 0 || n > cell_count {
            return None;
        }
        self.number(CELLS_IDX + n - 1)
    }

    pub fn heartbeat(&self, cell_count: usize) -> Option<u64> {
        self.fields.get(CELLS_IDX + cell_count)?.trim().parse().ok()
    }

    pub fn average_aux_soc(&self, cell_count: usize) -> Option<f64> {
        self.number(CELLS_IDX + cell_count + 1)
    }
}

/// Mode column written for a given lifecycle step.
pub fn mode_label(step: Step) -> &'static str {
    match step {
        Step::PhaseRi => "phase_ri",
        Step::Charge => "charge",
        Step::Discharge => "discharge",
        Step::FinalCharge => "final_charge",
        _ => "unknown",
    }
}

/// Handler for `{station}/bms/data`.
pub struct TelemetryHandler {
    station: String,
    cell_count: usize,
}

impl TelemetryHandler {
    pub fn new(station: &str, cell_count: usize) -> Self {
        Self {
            station: station.into(),
            cell_count,
        }
    }

    /// Process one telemetry line.
    ///
    /// The watchdog baseline is refreshed before anything else, even for
    /// lines that are then rejected. Returns the appended frame.
    pub fn handle(
        &self,
        payload: &str,
        step: Step,
        log: &mut TelemetryLog,
        records: &RecordStore,
        baseline: &Baseline,
    ) -> Option<TelemetryFrame> {
        baseline.touch();

        let frame = match TelemetryFrame::parse(payload) {
            Ok(frame) => frame,
            Err(TelemetryError::Empty) => {
                warn!("{}: empty bms/data payload", self.station);
                return None;
            }
            Err(e) => {
                error!("{}: malformed bms/data: {e}; payload {payload:?}", self.station);
                return None;
            }
        };

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut row = Vec::with_capacity(frame.fields().len() + 2);
        row.push(timestamp.clone());
        row.push(mode_label(step).to_string());
        row.extend(frame.fields().iter().cloned());

        if log.is_open() {
            if let Err(e) = log.append(&row) {
                error!("{}: telemetry row not written: {e}", self.station);
            }
        } else if !matches!(step, Step::Init | Step::Completed | Step::ManualStop) {
            error!(
                "{}: telemetry received with closed log (step {})",
                self.station,
                step.code()
            );
        }

        trace!(
            "{}: heartbeat={:?} nurse_soc={:?} cell1={:?}",
            self.station,
            frame.heartbeat(self.cell_count),
            frame.average_aux_soc(self.cell_count),
            frame.cell_mv(1, self.cell_count)
        );

        if !matches!(step, Step::Completed | Step::ManualStop) {
            match (frame.discharged_capacity(), frame.discharged_energy()) {
                (Some(ah), Some(wh)) => {
                    records.set_capacity(&timestamp, ah, wh);
                }
                _ => error!(
                    "{}: capacity/energy not numeric: {:?} / {:?}",
                    self.station,
                    frame.fields().get(CAPACITY_IDX),
                    frame.fields().get(ENERGY_IDX)
                ),
            }
        }
        Some(frame)
    }
}
