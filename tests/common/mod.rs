// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

#![allow(dead_code)]

use banc_control::bus::RecordingBus;
use banc_control::probe::StaticProbe;
use banc_control::router::Router;
use banc_control::store::{RegistryStore, StationEntry};
use banc_control::StationConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const STATION: &str = "banc1";
pub const SERIAL: &str = "SN0001";

/// A bench wired to an in-memory bus inside a scratch directory.
pub struct Bench {
    pub root: TempDir,
    pub config: StationConfig,
    pub bus: Arc<RecordingBus>,
    pub router: Router,
}

pub fn config_in(root: &TempDir) -> StationConfig {
    let mut config = StationConfig::default();
    config.paths.data_root = root.path().join("data");
    config.paths.archive_root = root.path().join("archive_fails");
    config.paths.registry = root.path().join("bancs_config.json");
    config.station.settle_secs = 0.0;
    config
}

pub fn bench_with(printer: Result<bool, String>, tune: impl FnOnce(&mut StationConfig)) -> Bench {
    let root = tempfile::tempdir().unwrap();
    let mut config = config_in(&root);
    tune(&mut config);
    let bus = Arc::new(RecordingBus::new());
    let router = Router::prepare(
        &config,
        STATION,
        SERIAL,
        bus.clone(),
        Box::new(StaticProbe(printer)),
    )
    .unwrap();
    Bench {
        root,
        config,
        bus,
        router,
    }
}

pub fn bench() -> Bench {
    bench_with(Ok(true), |_| {})
}

impl Bench {
    pub fn registry(&self) -> RegistryStore {
        RegistryStore::new(&self.config.paths.registry)
    }

    pub fn entry(&self) -> StationEntry {
        self.registry().entry(STATION).unwrap()
    }

    pub fn test_dir(&self) -> PathBuf {
        self.router.records().dir().to_path_buf()
    }

    pub fn csv_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.test_dir().join("data.csv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn step(&mut self, payload: &str) -> Option<banc_control::lifecycle::Terminal> {
        let topic = format!("{STATION}/step");
        self.router.dispatch(&topic, payload.as_bytes())
    }

    pub fn bms(&mut self, payload: &str) {
        let topic = format!("{STATION}/bms/data");
        self.router.dispatch(&topic, payload.as_bytes());
    }
}
