// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v1.1
// Date Modified: 2026-10-19
// Author: Lukas Bower

//! Control process for one battery test bench ("banc").
//!
//! The embedded controller on each bench reports lifecycle steps, BMS
//! telemetry and RI/diffusion results over MQTT. This crate interprets those
//! reports for a single bench: it drives the test lifecycle, keeps the
//! per-test record and the shared fleet registry up to date, appends the
//! telemetry log and raises an alert when the telemetry stream stalls.

/// Runtime configuration (TOML file plus environment overrides).
pub mod config;

/// Persistence: per-test record, fleet registry and on-disk layout.
pub mod store;

/// Telemetry frame parsing, the append-only log and the `bms/data` handler.
pub mod telemetry;

/// RI / diffusion results handler.
pub mod results;

/// Liveness watchdog for the telemetry stream.
pub mod watchdog;

/// Bus abstraction and the MQTT transport.
pub mod bus;

/// Presence probe for the label printing service.
pub mod probe;

/// Lifecycle state machine and its transition table.
pub mod lifecycle;

/// Topic demultiplexer for inbound bus messages.
pub mod router;

/// Session runner tying startup, the network loop and shutdown together.
pub mod station;

/// Command line surface of the `banc` binary.
pub mod cli;

pub use config::StationConfig;
pub use lifecycle::Step;
pub use station::Session;
