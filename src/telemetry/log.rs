// CLASSIFICATION: COMMUNITY
// Filename: log.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Append-only telemetry log (`data.csv`).
//!
//! The file is created once with a header row and afterwards only opened in
//! append mode. Each row is flushed before `append` returns so a crash loses
//! at most the row being written.

use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::TelemetryError;
use crate::store::layout::TELEMETRY_FILE;

const LEADING_COLUMNS: [&str; 12] = [
    "Timestamp",
    "Mode",
    "Voltage",
    "Current",
    "SOC",
    "Temperature",
    "MaxCellNum",
    "MaxCellV",
    "MinCellNum",
    "MinCellV",
    "DischargedCapacity",
    "DischargedEnergy",
];

/// Header row for a bench with `cell_count` cells.
pub fn header(cell_count: usize) -> Vec<String> {
    let mut cols: Vec<String> = LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    cols.extend((1..=cell_count).map(|i| format!("Cell_{i}mV")));
    cols.push("HeartBeat".into());
    cols.push("AverageNurseSOC".into());
    cols
}

/// Quote a field when it would otherwise break the row.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Create `data.csv` with its header if it does not exist yet.
///
/// Returns `true` when the file was created.
pub fn ensure_log(dir: &Path, cell_count: usize) -> Result<bool, TelemetryError> {
    let path = dir.join(TELEMETRY_FILE);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(source) => return Err(TelemetryError::Io { path, source }),
    };
    file.write_all(encode_row(&header(cell_count)).as_bytes())
        .map_err(|source| TelemetryError::Io {
            path: path.clone(),
            source,
        })?;
    info!("created telemetry log {}", path.display());
    Ok(true)
}

/// Open handle on a test's telemetry log.
pub struct TelemetryLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: usize,
}

impl TelemetryLog {
    /// Open `dir/data.csv` for appending.
    pub fn open_append(dir: &Path) -> Result<Self, TelemetryError> {
        let path = dir.join(TELEMETRY_FILE);
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| TelemetryError::Io {
                path: path.clone(),
                source,
            })?;
        info!("telemetry log open for append: {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            rows: 0,
        })
    }

    /// Handle that rejects every row; used when the file cannot be opened.
    pub fn closed(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            rows: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Append one row and flush it.
    pub fn append<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), TelemetryError> {
        let writer = self.writer.as_mut().ok_or(TelemetryError::Closed)?;
        let line = encode_row(fields);
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| TelemetryError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and release the file. Closing twice is a no-op.
    pub fn close(&mut self) {
        match self.writer.take() {
            Some(mut writer) => {
                if let Err(e) = writer.flush() {
                    log::error!("flush of {} on close failed: {e}", self.path.display());
                }
                info!("telemetry log closed: {}", self.path.display());
            }
            None => debug!("telemetry log already closed"),
        }
    }
}

impl Drop for TelemetryLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
