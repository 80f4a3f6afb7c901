// CLASSIFICATION: COMMUNITY
// Filename: lifecycle.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Test lifecycle driven by `{station}/step`.
//!
//! Steps 1–4 are the running phases. Steps 5–9 are terminal and are only
//! reached through an inbound message. What each step does is spelled out
//! once in [`Step::effects`]; [`Lifecycle::handle`] applies that bundle with
//! best-effort sequencing: a failed side effect is logged and the remaining
//! ones still run. Terminal transitions return a [`Terminal`] marker and the
//! session performs the common close/settle/disconnect/exit sequence.

use log::{error, info, warn};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::bus::{topics, Bus, Delivery};
use crate::probe::ServiceProbe;
use crate::store::{iso_now, DataLayout, RecordStore, RegistryStore};
use crate::telemetry::log::TelemetryLog;

pub const PRINTER_INACTIVE_ALERT: &str = "Service impression INACTIF! Actions fin compromises.";
pub const PRINTER_CHECK_ALERT: &str = "Erreur vérification service impression!";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Step {
    Init = 0,
    PhaseRi = 1,
    Charge = 2,
    Discharge = 3,
    FinalCharge = 4,
    Completed = 5,
    Failed = 6,
    SecurityStop = 7,
    StopRequested = 8,
    ManualStop = 9,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("step payload {0:?} is not an integer")]
    NotInteger(String),
    #[error("step {0} is outside 1-9")]
    OutOfRange(i64),
    #[error("step {new} would go back from {current}")]
    Regression { current: u8, new: u8 },
}

/// What happens to the registry entry on a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryEffect {
    UpdateStep,
    Reset,
    Keep,
}

/// Side effects bundled with a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Effects {
    pub persist_step: bool,
    pub close_log: bool,
    pub registry: RegistryEffect,
    pub handoff: bool,
    pub archive: bool,
    pub unsubscribe_telemetry: bool,
    pub settle: bool,
    pub disconnect: bool,
    pub exit: bool,
}

const RUNNING: Effects = Effects {
    persist_step: true,
    close_log: false,
    registry: RegistryEffect::UpdateStep,
    handoff: false,
    archive: false,
    unsubscribe_telemetry: false,
    settle: false,
    disconnect: false,
    exit: false,
};

const STOPPED: Effects = Effects {
    persist_step: false,
    close_log: true,
    registry: RegistryEffect::Keep,
    handoff: false,
    archive: false,
    unsubscribe_telemetry: false,
    settle: false,
    disconnect: true,
    exit: true,
};

impl Step {
    pub fn from_code(code: u8) -> Option<Step> {
        Some(match code {
            0 => Step::Init,
            1 => Step::PhaseRi,
            2 => Step::Charge,
            3 => Step::Discharge,
            4 => Step::FinalCharge,
            5 => Step::Completed,
            6 => Step::Failed,
            7 => Step::SecurityStop,
            8 => Step::StopRequested,
            9 => Step::ManualStop,
            _ => return None,
        })
    }

    /// Parse an inbound `step` payload. Only 1–9 are accepted.
    pub fn parse_payload(payload: &str) -> Result<Step, StepError> {
        let trimmed = payload.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| StepError::NotInteger(trimmed.to_string()))?;
        u8::try_from(value)
            .ok()
            .filter(|v| (1..=9).contains(v))
            .and_then(Step::from_code)
            .ok_or(StepError::OutOfRange(value))
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        (1..=4).contains(&self.code())
    }

    pub fn is_terminal(self) -> bool {
        self.code() >= 5
    }

    /// Transition table.
    pub fn effects(self) -> Effects {
        match self {
            Step::Init => Effects {
                persist_step: false,
                registry: RegistryEffect::Keep,
                ..RUNNING
            },
            Step::PhaseRi | Step::Charge | Step::Discharge | Step::FinalCharge => RUNNING,
            Step::Completed => Effects {
                persist_step: true,
                registry: RegistryEffect::Reset,
                handoff: true,
                unsubscribe_telemetry: true,
                settle: true,
                ..STOPPED
            },
            Step::Failed => Effects {
                registry: RegistryEffect::Reset,
                archive: true,
                ..STOPPED
            },
            Step::SecurityStop | Step::StopRequested | Step::ManualStop => STOPPED,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Init => "init",
            Step::PhaseRi => "phase_ri",
            Step::Charge => "charge",
            Step::Discharge => "discharge",
            Step::FinalCharge => "final_charge",
            Step::Completed => "completed",
            Step::Failed => "failed",
            Step::SecurityStop => "security_stop",
            Step::StopRequested => "stop_requested",
            Step::ManualStop => "manual_stop",
        };
        write!(f, "{name}({})", self.code())
    }
}

/// Marker returned once a terminal step has been applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Terminal {
    pub step: Step,
    pub effects: Effects,
}

/// Result of handling one `step` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Ignored,
    Advanced(Step),
    Terminal(Terminal),
}

/// Everything a transition may touch.
pub struct StepContext<'a> {
    pub station: &'a str,
    pub serial: &'a str,
    pub records: &'a mut RecordStore,
    pub registry: &'a RegistryStore,
    pub layout: &'a DataLayout,
    pub log: &'a mut TelemetryLog,
    pub bus: &'a dyn Bus,
    pub probe: &'a dyn ServiceProbe,
}

/// Lifecycle state of one bench.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    current: Step,
    terminal: Option<Step>,
    enforce_monotonic: bool,
}

impl Lifecycle {
    /// Start from the step loaded from the test record.
    pub fn new(current: Step, enforce_monotonic: bool) -> Self {
        Self {
            current,
            terminal: None,
            enforce_monotonic,
        }
    }

    pub fn current(&self) -> Step {
        self.current
    }

    pub fn terminal(&self) -> Option<Step> {
        self.terminal
    }

    fn check_order(&self, new: Step) -> Result<(), StepError> {
        if self.enforce_monotonic
            && new.is_running()
            && self.current.is_running()
            && new < self.current
        {
            return Err(StepError::Regression {
                current: self.current.code(),
                new: new.code(),
            });
        }
        Ok(())
    }

    /// Handle one raw `step` payload.
    pub fn handle(&mut self, payload: &str, ctx: &mut StepContext<'_>) -> Transition {
        let step = match Step::parse_payload(payload).and_then(|s| {
            self.check_order(s)?;
            Ok(s)
        }) {
            Ok(step) => step,
            Err(e) => {
                error!("{}: step message ignored: {e}", ctx.station);
                return Transition::Ignored;
            }
        };
        if let Some(done) = self.terminal {
            warn!("{}: {step} received after {done}; ignored", ctx.station);
            return Transition::Ignored;
        }
        self.apply(step, ctx)
    }

    /// Apply the effect bundle of `step`.
    pub fn apply(&mut self, step: Step, ctx: &mut StepContext<'_>) -> Transition {
        let effects = step.effects();
        info!("{}: step {} -> {step}", ctx.station, self.current);

        if effects.persist_step {
            ctx.records.set_step(step.code());
            self.current = step;
        }

        match effects.registry {
            RegistryEffect::UpdateStep => {
                ctx.registry.update_step(ctx.station, step.code());
            }
            RegistryEffect::Reset if !effects.archive => ctx.registry.reset_entry(ctx.station),
            _ => {}
        }

        if effects.handoff {
            hand_off(ctx);
        }

        if effects.close_log {
            ctx.log.close();
        }

        if effects.archive {
            archive(ctx);
            if effects.registry == RegistryEffect::Reset {
                ctx.registry.reset_entry(ctx.station);
            }
        }

        if effects.unsubscribe_telemetry {
            let topic = topics::bms_data(ctx.station);
            match ctx.bus.unsubscribe(&topic) {
                Ok(()) => info!("{}: unsubscribed from {topic}", ctx.station),
                Err(e) => error!("{}: unsubscribe {topic} failed: {e}", ctx.station),
            }
        }

        if step.is_terminal() {
            match step {
                Step::SecurityStop => error!(
                    "{}: security stop; registry kept for resume at step {}",
                    ctx.station,
                    self.current.code()
                ),
                Step::Failed => error!("{}: test failed", ctx.station),
                _ => info!("{}: test finished with {step}", ctx.station),
            }
            self.terminal = Some(step);
            Transition::Terminal(Terminal { step, effects })
        } else {
            Transition::Advanced(step)
        }
    }
}

/// Publish the completion handoff, or an alert when the printing service is
/// not running.
fn hand_off(ctx: &mut StepContext<'_>) {
    let done_at = iso_now();
    let alert = match ctx.probe.is_running() {
        Ok(true) => None,
        Ok(false) => {
            warn!("{}: printing service not detected", ctx.station);
            Some(PRINTER_INACTIVE_ALERT)
        }
        Err(e) => {
            error!("{}: printing service check failed: {e}", ctx.station);
            Some(PRINTER_CHECK_ALERT)
        }
    };

    if let Some(alert) = alert {
        let topic = topics::security(ctx.station);
        if let Err(e) = ctx.bus.publish(&topic, alert.as_bytes(), Delivery::AtLeastOnce) {
            error!("{}: alert on {topic} failed: {e}", ctx.station);
        }
        warn!("{}: no handoff sent to the printing service", ctx.station);
        return;
    }

    let payload = json!({
        "serial_number": ctx.serial,
        "timestamp_test_done": done_at,
    })
    .to_string();
    match ctx.bus.publish(
        topics::PRINTER_TEST_DONE,
        payload.as_bytes(),
        Delivery::AtLeastOnce,
    ) {
        Ok(()) => info!("{}: handoff published: {payload}", ctx.station),
        Err(e) => error!("{}: handoff publish failed: {e}", ctx.station),
    }
}

fn archive(ctx: &mut StepContext<'_>) {
    let dir = ctx.records.dir().to_path_buf();
    match ctx.layout.archive(&dir) {
        Ok(dest) => {
            info!(
                "{}: test directory {} archived to {}",
                ctx.station,
                dir.display(),
                dest.display()
            );
            ctx.records.relocate(dest);
        }
        Err(e) => error!("{}: archiving {} failed: {e}", ctx.station, dir.display()),
    }
}
