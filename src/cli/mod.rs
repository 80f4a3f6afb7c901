// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v1.1
// Date Modified: 2026-10-19
// Author: Lukas Bower

//! CLI module for the bench control process. Exports the argument parser and
//! the entry point used by `main`.

pub mod args;

use anyhow::Context;
use clap::error::ErrorKind;
use log::error;
use std::path::Path;

use crate::cli::args::build_cli;
use crate::config::StationConfig;
use crate::station::Session;

/// Parse arguments, load configuration and run the session.
/// Returns the process exit code.
pub fn run() -> anyhow::Result<i32> {
    let matches = match build_cli().try_get_matches() {
        Ok(m) => m,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(0);
        }
        Err(e) => {
            e.print()?;
            return Ok(1);
        }
    };
    let station = matches
        .get_one::<String>("station")
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let serial = matches.get_one::<String>("serial").cloned().unwrap_or_default();
    let config_path = matches.get_one::<String>("config").map(Path::new);

    let config = StationConfig::load(config_path).context("loading configuration")?;
    if !config.is_valid_station(&station) {
        error!(
            "invalid station {station:?}; expected one of {:?}",
            config.station.valid
        );
        return Ok(1);
    }
    if serial.trim().is_empty() {
        error!("empty serial number");
        return Ok(1);
    }

    let mut session = Session::start(config, &station, &serial)
        .with_context(|| format!("starting {station} for {serial}"))?;
    let code = session.run().with_context(|| format!("{station} session"))?;
    Ok(code)
}
