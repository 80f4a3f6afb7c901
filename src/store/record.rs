// CLASSIFICATION: COMMUNITY
// Filename: record.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Per-test record (`config.json`).
//!
//! The JSON key names are shared with the operator console and the export
//! job, so the Rust field names are mapped onto them explicitly. Keys this
//! crate does not know about are carried through unchanged.

use log::{debug, error, info};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::layout::{DataLayout, RECORD_FILE};
use super::{iso_now, read_json, write_json, StoreError, StoreResult};
use crate::telemetry::log::ensure_log;

fn first_step() -> u8 {
    1
}

/// Totals written as `null` (a non-finite value serialised by an older
/// writer) read back as zero instead of making the record unreadable.
fn null_as_zero<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(de)?.unwrap_or_default())
}

/// Persisted state of one battery test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    #[serde(rename = "battery_serial", default)]
    pub serial: String,
    #[serde(rename = "banc", default)]
    pub station_id: String,
    #[serde(default = "first_step")]
    pub current_step: u8,
    #[serde(rename = "first_handle", default)]
    pub created_at: String,
    #[serde(rename = "timestamp_last_update", default)]
    pub last_updated_at: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub capacity_ah: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub capacity_wh: f64,
    #[serde(rename = "ri_discharge_average", default, deserialize_with = "null_as_zero")]
    pub ri_discharge_avg: f64,
    #[serde(rename = "ri_charge_average", default, deserialize_with = "null_as_zero")]
    pub ri_charge_avg: f64,
    #[serde(rename = "diffusion_discharge_average", default, deserialize_with = "null_as_zero")]
    pub diffusion_discharge_avg: f64,
    #[serde(rename = "diffusion_charge_average", default, deserialize_with = "null_as_zero")]
    pub diffusion_charge_avg: f64,
    #[serde(rename = "delta_ri_average", default, skip_serializing_if = "Option::is_none")]
    pub delta_ri_avg: Option<f64>,
    #[serde(
        rename = "delta_diffusion_average",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub delta_diffusion_avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_ri_cells: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_diffusion_cells: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestRecord {
    /// Fresh record for a newly assigned battery.
    pub fn new(serial: &str, station_id: &str) -> Self {
        let now = iso_now();
        Self {
            serial: serial.into(),
            station_id: station_id.into(),
            current_step: first_step(),
            created_at: now.clone(),
            last_updated_at: now,
            capacity_ah: 0.0,
            capacity_wh: 0.0,
            ri_discharge_avg: 0.0,
            ri_charge_avg: 0.0,
            diffusion_discharge_avg: 0.0,
            diffusion_charge_avg: 0.0,
            delta_ri_avg: None,
            delta_diffusion_avg: None,
            delta_ri_cells: None,
            delta_diffusion_cells: None,
            extra: Map::new(),
        }
    }
}

/// Read-modify-write access to one test's `config.json`.
#[derive(Clone, Debug)]
pub struct RecordStore {
    station: String,
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(station: &str, dir: impl Into<PathBuf>) -> Self {
        Self {
            station: station.into(),
            dir: dir.into(),
        }
    }

    /// Resolve the test directory for `serial` and load or create its record.
    ///
    /// A directory ending in `-{serial}` under the station subtree is reused;
    /// otherwise `{ddmmyyyy}-{serial}` is created. An unreadable record is
    /// replaced by a default one. The telemetry log is ensured to exist with
    /// its header in every case. Failing to create the directory or the
    /// default record is an error.
    pub fn load_or_create(
        layout: &DataLayout,
        station: &str,
        serial: &str,
        cell_count: usize,
    ) -> StoreResult<(Self, TestRecord)> {
        let dir = layout.resolve_test_dir(station, serial);
        let store = Self::new(station, dir);
        let path = store.path();

        let record = if path.exists() {
            match read_json::<TestRecord>(&path) {
                Ok(record) => {
                    info!("{station}: loaded record {}", path.display());
                    Some(record)
                }
                Err(e) => {
                    error!("{station}: {e}; recreating default record");
                    None
                }
            }
        } else {
            None
        };

        let record = match record {
            Some(record) => record,
            None => {
                fs::create_dir_all(&store.dir).map_err(|e| StoreError::io(&store.dir, e))?;
                let record = TestRecord::new(serial, station);
                write_json(&path, &record)?;
                info!("{station}: created record {}", path.display());
                record
            }
        };

        if let Err(e) = ensure_log(&store.dir, cell_count) {
            error!("{station}: cannot create telemetry log: {e}");
        }
        Ok((store, record))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub fn load(&self) -> StoreResult<TestRecord> {
        read_json(&self.path())
    }

    /// Apply `mutation` to the persisted record.
    pub fn try_update<F>(&self, mutation: F) -> StoreResult<TestRecord>
    where
        F: FnOnce(&mut TestRecord),
    {
        if !self.dir.is_dir() {
            return Err(StoreError::MissingDir {
                path: self.dir.clone(),
            });
        }
        let path = self.path();
        let mut record: TestRecord = read_json(&path)?;
        mutation(&mut record);
        write_json(&path, &record)?;
        Ok(record)
    }

    /// Like [`try_update`](Self::try_update) but logs failures and reports
    /// only whether the write happened.
    pub fn update<F>(&self, mutation: F) -> bool
    where
        F: FnOnce(&mut TestRecord),
    {
        match self.try_update(mutation) {
            Ok(_) => true,
            Err(e) => {
                error!("{}: record update skipped: {e}", self.station);
                false
            }
        }
    }

    /// Record a lifecycle step change.
    pub fn set_step(&self, step: u8) -> bool {
        let ok = self.update(|r| {
            r.current_step = step;
            r.last_updated_at = iso_now();
        });
        if ok {
            info!("{}: record current_step={step}", self.station);
        }
        ok
    }

    /// Record the latest telemetry totals.
    pub fn set_capacity(&self, timestamp: &str, ah: f64, wh: f64) -> bool {
        if !ah.is_finite() || !wh.is_finite() {
            error!("{}: non-finite capacity {ah} Ah / {wh} Wh ignored", self.station);
            return false;
        }
        let ok = self.update(|r| {
            r.last_updated_at = timestamp.into();
            r.capacity_ah = ah;
            r.capacity_wh = wh;
        });
        if ok {
            log::trace!("{}: capacity {ah} Ah / {wh} Wh", self.station);
        }
        ok
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    /// Point the store at a directory that has been moved.
    pub fn relocate(&mut self, dir: PathBuf) {
        debug!("{}: record relocated to {}", self.station, dir.display());
        self.dir = dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unknown_keys_survive_an_update() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new("banc1", dir.path());
        fs::write(
            store.path(),
            r#"{"battery_serial":"S1","banc":"banc1","current_step":2,"operator":"ana"}"#,
        )
        .unwrap();

        assert!(store.set_step(3));
        let raw: Value = read_json(&store.path()).unwrap();
        assert_eq!(raw["current_step"], 3);
        assert_eq!(raw["operator"], "ana");
    }

    #[test]
    fn missing_record_is_not_updated() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new("banc1", dir.path());
        assert!(!store.set_step(2));
        assert!(!store.path().exists());
    }

    #[test]
    fn null_totals_read_as_zero() {
        let rec: TestRecord = serde_json::from_str(
            r#"{"current_step":3,"capacity_ah":null,"capacity_wh":null,"ri_charge_average":null}"#,
        )
        .unwrap();
        assert_eq!(rec.current_step, 3);
        assert_eq!(rec.capacity_ah, 0.0);
        assert_eq!(rec.ri_charge_avg, 0.0);
    }

    #[test]
    fn non_finite_capacity_is_refused() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new("banc1", dir.path());
        write_json(&store.path(), &TestRecord::new("S1", "banc1")).unwrap();
        assert!(!store.set_capacity("2026-01-01 00:00:00", f64::NAN, 1.0));
        assert!(store.set_capacity("2026-01-01 00:00:01", 2.5, 1.0));
        assert_eq!(store.load().unwrap().capacity_ah, 2.5);
    }

    #[test]
    fn integer_totals_deserialize() {
        let rec: TestRecord =
            serde_json::from_str(r#"{"capacity_ah":0,"capacity_wh":12}"#).unwrap();
        assert_eq!(rec.capacity_wh, 12.0);
        assert_eq!(rec.current_step, 1);
    }
}
