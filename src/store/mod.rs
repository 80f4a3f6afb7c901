// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Persistence for bench tests.
//!
//! Two JSON documents are kept: the per-test [`record::TestRecord`] and the
//! shared [`registry::FleetRegistry`]. Every write re-reads the whole file,
//! applies the change in memory and writes the whole file back through a
//! temporary sibling that is renamed into place.

pub mod layout;
pub mod record;
pub mod registry;

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use layout::DataLayout;
pub use record::{RecordStore, TestRecord};
pub use registry::{FleetRegistry, RegistryStore, StationEntry, StationStatus};

/// Errors raised by the record and registry stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: invalid document: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: no entry for station {station}")]
    UnknownStation { path: PathBuf, station: String },
    #[error("{path}: test directory missing")]
    MissingDir { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read and decode a JSON document.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let data = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&data).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode `value` and replace `path` with it.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let body = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

/// Local ISO-8601 timestamp used in persisted documents.
pub fn iso_now() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
