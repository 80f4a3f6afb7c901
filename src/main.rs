// CLASSIFICATION: COMMUNITY
// Filename: main.rs v1.1
// Date Modified: 2026-10-19
// Author: Lukas Bower

//! Entry point for the `banc` control process.

use banc_control::cli;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let code = match cli::run() {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            1
        }
    };
    std::process::exit(code);
}
