// CLASSIFICATION: COMMUNITY
// Filename: layout.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! On-disk layout of test directories.
//!
//! ```text
//! {data_root}/{station}/{ddmmyyyy}-{serial}/config.json
//! {data_root}/{station}/{ddmmyyyy}-{serial}/data.csv
//! {archive_root}/{ddmmyyyy}-{serial}[_{YYYYmmddHHMMSS}]
//! ```

use chrono::Local;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::{StoreError, StoreResult};

pub const RECORD_FILE: &str = "config.json";
pub const TELEMETRY_FILE: &str = "data.csv";

/// Resolves test directories under the data and archive roots.
#[derive(Clone, Debug)]
pub struct DataLayout {
    data_root: PathBuf,
    archive_root: PathBuf,
}

impl DataLayout {
    pub fn new(data_root: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            archive_root: archive_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn station_dir(&self, station: &str) -> PathBuf {
        self.data_root.join(station)
    }

    /// Find an existing directory for `serial` in the station's subtree.
    ///
    /// Only entries whose name ends in `-{serial}` are considered; the first
    /// match in directory order wins.
    pub fn find_test_dir(&self, station: &str, serial: &str) -> Option<PathBuf> {
        let station_dir = self.station_dir(station);
        let suffix = format!("-{serial}");
        let entries = match fs::read_dir(&station_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("{station}: cannot scan {}: {e}", station_dir.display());
                }
                return None;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(&suffix) {
                debug!("{station}: found {} for {serial}", entry.path().display());
                return Some(entry.path());
            }
        }
        None
    }

    /// Directory a brand new test for `serial` would use today.
    pub fn new_test_dir(&self, station: &str, serial: &str) -> PathBuf {
        let date = Local::now().format("%d%m%Y");
        self.station_dir(station).join(format!("{date}-{serial}"))
    }

    /// Existing directory for `serial` or today's new one.
    pub fn resolve_test_dir(&self, station: &str, serial: &str) -> PathBuf {
        match self.find_test_dir(station, serial) {
            Some(dir) => dir,
            None => {
                let dir = self.new_test_dir(station, serial);
                info!("{station}: no existing directory, using {}", dir.display());
                dir
            }
        }
    }

    /// Move a failed test directory under the archive root.
    ///
    /// When the destination name is already taken a `_{YYYYmmddHHMMSS}`
    /// suffix is appended, then a counter if that is taken too. Returns the
    /// final destination.
    pub fn archive(&self, test_dir: &Path) -> StoreResult<PathBuf> {
        if !test_dir.is_dir() {
            return Err(StoreError::MissingDir {
                path: test_dir.to_path_buf(),
            });
        }
        fs::create_dir_all(&self.archive_root)
            .map_err(|e| StoreError::io(&self.archive_root, e))?;
        let name = test_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".into());
        let mut dest = self.archive_root.join(&name);
        if dest.exists() {
            let stamped = format!("{name}_{}", Local::now().format("%Y%m%d%H%M%S"));
            dest = self.archive_root.join(&stamped);
            let mut n = 1;
            while dest.exists() {
                dest = self.archive_root.join(format!("{stamped}_{n}"));
                n += 1;
            }
            warn!("{name} already archived, using {}", dest.display());
        }
        move_dir(test_dir, &dest)?;
        Ok(dest)
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_dir(src: &Path, dest: &Path) -> StoreResult<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    copy_tree(src, dest)?;
    fs::remove_dir_all(src).map_err(|e| StoreError::io(src, e))
}

fn copy_tree(src: &Path, dest: &Path) -> StoreResult<()> {
    fs::create_dir_all(dest).map_err(|e| StoreError::io(dest, e))?;
    for entry in fs::read_dir(src).map_err(|e| StoreError::io(src, e))? {
        let entry = entry.map_err(|e| StoreError::io(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| StoreError::io(&from, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_directory_by_serial_suffix() {
        let root = tempdir().unwrap();
        let layout = DataLayout::new(root.path().join("data"), root.path().join("archive"));
        fs::create_dir_all(layout.station_dir("banc2").join("01022026-SN42")).unwrap();
        fs::create_dir_all(layout.station_dir("banc1").join("01022026-SN43")).unwrap();

        let found = layout.find_test_dir("banc2", "SN42").unwrap();
        assert!(found.ends_with("01022026-SN42"));
        assert!(layout.find_test_dir("banc2", "SN43").is_none());
        assert!(layout.find_test_dir("banc3", "SN42").is_none());
    }

    #[test]
    fn new_directory_is_dated() {
        let layout = DataLayout::new("data", "data/archive_fails");
        let dir = layout.new_test_dir("banc1", "RW-1");
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), "ddmmyyyy-RW-1".len());
        assert!(name.ends_with("-RW-1"));
        assert!(dir.starts_with("data/banc1"));
    }
}
