// CLASSIFICATION: COMMUNITY
// Filename: registry.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Fleet registry (`bancs_config.json`).
//!
//! The registry lists every bench with its occupancy. It is written by the
//! launcher, by every bench control process and read by the console, so each
//! read-modify-write holds an exclusive advisory lock on a sidecar
//! `.lock` file. Writers that do not take the lock still see
//! last-write-wins semantics.

use fs2::FileExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::{read_json, write_json, StoreError, StoreResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    #[default]
    Available,
    Occupied,
}

/// One bench in the registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: StationStatus,
    #[serde(rename = "serial-pending", default)]
    pub serial_pending: Option<String>,
    #[serde(default)]
    pub current_step: Option<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StationEntry {
    pub fn available(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StationStatus::Available,
            serial_pending: None,
            current_step: None,
            extra: Map::new(),
        }
    }

    pub fn matches(&self, station: &str) -> bool {
        self.name.eq_ignore_ascii_case(station)
    }

    fn reset(&mut self) {
        self.status = StationStatus::Available;
        self.serial_pending = None;
        self.current_step = None;
    }
}

/// Whole registry document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetRegistry {
    #[serde(rename = "bancs", default)]
    pub stations: Vec<StationEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FleetRegistry {
    /// Default registry with one available entry per station id.
    ///
    /// Entry names are capitalised (`banc1` -> `Banc1`) as the console
    /// displays them; lookups are case-insensitive.
    pub fn with_stations<S: AsRef<str>>(ids: &[S]) -> Self {
        let stations = ids
            .iter()
            .map(|id| StationEntry::available(capitalize(id.as_ref())))
            .collect();
        Self {
            stations,
            extra: Map::new(),
        }
    }

    pub fn entry(&self, station: &str) -> Option<&StationEntry> {
        self.stations.iter().find(|e| e.matches(station))
    }

    pub fn entry_mut(&mut self, station: &str) -> Option<&mut StationEntry> {
        self.stations.iter_mut().find(|e| e.matches(station))
    }
}

fn capitalize(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Locked read-modify-write access to the registry file.
#[derive(Clone, Debug)]
pub struct RegistryStore {
    path: PathBuf,
}

/// Exclusive advisory lock, released on drop.
struct RegistryLock {
    file: File,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut p = self.path.as_os_str().to_owned();
        p.push(".lock");
        PathBuf::from(p)
    }

    fn lock(&self) -> StoreResult<RegistryLock> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| StoreError::io(&lock_path, e))?;
        Ok(RegistryLock { file })
    }

    /// Read the registry without taking the lock.
    pub fn load(&self) -> StoreResult<FleetRegistry> {
        read_json(&self.path)
    }

    /// Make sure the registry exists, creating default entries if absent.
    ///
    /// An existing file is returned as-is; an unreadable one is reported but
    /// never overwritten since other processes own parts of it.
    pub fn load_or_create<S: AsRef<str>>(&self, stations: &[S]) -> StoreResult<FleetRegistry> {
        let _guard = self.lock()?;
        if self.path.exists() {
            return self.load();
        }
        let registry = FleetRegistry::with_stations(stations);
        write_json(&self.path, &registry)?;
        warn!("registry {} missing, created defaults", self.path.display());
        Ok(registry)
    }

    /// Apply `mutation` to the entry for `station` under the lock.
    pub fn try_update_entry<F>(&self, station: &str, mutation: F) -> StoreResult<StationEntry>
    where
        F: FnOnce(&mut StationEntry),
    {
        let _guard = self.lock()?;
        let mut registry: FleetRegistry = read_json(&self.path)?;
        let entry = registry
            .entry_mut(station)
            .ok_or_else(|| StoreError::UnknownStation {
                path: self.path.clone(),
                station: station.into(),
            })?;
        mutation(entry);
        let updated = entry.clone();
        write_json(&self.path, &registry)?;
        debug!("registry entry {station} saved: {updated:?}");
        Ok(updated)
    }

    /// Set the entry's `current_step`. Returns whether the file was written.
    pub fn update_step(&self, station: &str, step: u8) -> bool {
        match self.try_update_entry(station, |e| e.current_step = Some(step)) {
            Ok(_) => {
                info!("{station}: registry current_step={step}");
                true
            }
            Err(e) => {
                error!("{station}: registry step update skipped: {e}");
                false
            }
        }
    }

    /// Mark the station available and clear its pending serial and step.
    pub fn reset_entry(&self, station: &str) {
        match self.try_update_entry(station, StationEntry::reset) {
            Ok(_) => info!("{station}: registry entry reset to available"),
            Err(e) => error!("{station}: registry reset skipped: {e}"),
        }
    }

    /// Launcher side: set status and, when given, pending serial and step.
    pub fn set_status(
        &self,
        station: &str,
        status: StationStatus,
        serial_pending: Option<&str>,
        current_step: Option<u8>,
    ) -> bool {
        let result = self.try_update_entry(station, |e| {
            e.status = status;
            if let Some(serial) = serial_pending {
                e.serial_pending = Some(serial.into());
            }
            if let Some(step) = current_step {
                e.current_step = Some(step);
            }
        });
        match result {
            Ok(_) => true,
            Err(e) => {
                error!("{station}: registry status update skipped: {e}");
                false
            }
        }
    }

    /// Entry for `station`, if the registry is readable and lists it.
    pub fn entry(&self, station: &str) -> Option<StationEntry> {
        self.load().ok()?.entry(station).cloned()
    }

    /// Name of the station waiting for `serial`, if any.
    pub fn station_for_serial(&self, serial: &str) -> Option<String> {
        self.load()
            .ok()?
            .stations
            .into_iter()
            .find(|e| e.serial_pending.as_deref() == Some(serial))
            .map(|e| e.name)
    }
}
