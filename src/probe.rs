// CLASSIFICATION: COMMUNITY
// Filename: probe.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Presence check for the label printing service.
//!
//! The printing service is a separate long running process. Before handing
//! a completed test over, the control process checks that some process on
//! the host carries the configured fragment in its command line.

use log::debug;
use sysinfo::{ProcessExt, System, SystemExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("process table unavailable: {0}")]
    Unavailable(String),
}

/// Answers whether a collaborator service is running.
pub trait ServiceProbe: Send + Sync {
    fn is_running(&self) -> Result<bool, ProbeError>;
}

/// Scans the host process table.
pub struct ProcessProbe {
    fragment: String,
}

impl ProcessProbe {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
        }
    }
}

impl ServiceProbe for ProcessProbe {
    fn is_running(&self) -> Result<bool, ProbeError> {
        if self.fragment.is_empty() {
            return Err(ProbeError::Unavailable("empty process pattern".into()));
        }
        let mut sys = System::new();
        sys.refresh_processes();
        let found = sys.processes().iter().find(|(_, proc_)| {
            proc_.cmd().iter().any(|arg| arg.contains(&self.fragment))
        });
        match found {
            Some((pid, _)) => {
                debug!("{} found as pid {pid}", self.fragment);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Fixed answer; used when no process table should be consulted.
pub struct StaticProbe(pub Result<bool, String>);

impl ServiceProbe for StaticProbe {
    fn is_running(&self) -> Result<bool, ProbeError> {
        self.0.clone().map_err(ProbeError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_is_an_error() {
        assert!(ProcessProbe::new("").is_running().is_err());
    }

    #[test]
    fn static_probe_reports_its_answer() {
        assert!(StaticProbe(Ok(true)).is_running().unwrap());
        assert!(StaticProbe(Err("boom".into())).is_running().is_err());
    }
}
