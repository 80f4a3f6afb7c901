// CLASSIFICATION: COMMUNITY
// Filename: args.rs v1.1
// Date Modified: 2026-10-19
// Author: Lukas Bower

use clap::{Arg, Command};

/// Builds the argument parser for the `banc` control process.
pub fn build_cli() -> Command {
    Command::new("banc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Battery test bench control process")
        .arg(
            Arg::new("station")
                .value_name("STATION")
                .help("Bench id, e.g. banc1")
                .required(true),
        )
        .arg(
            Arg::new("serial")
                .value_name("SERIAL")
                .help("Serial number of the battery under test")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .required(false),
        )
}
