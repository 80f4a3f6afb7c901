// CLASSIFICATION: COMMUNITY
// Filename: watchdog_alerts.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

use banc_control::bus::{topics, RecordingBus};
use banc_control::watchdog::{Baseline, Watchdog};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(30);

fn watchdog(bus: &Arc<RecordingBus>, baseline: &Baseline) -> Watchdog {
    Watchdog::new(
        "banc2",
        baseline.clone(),
        TIMEOUT,
        Duration::from_secs(10),
        bus.clone(),
    )
}

#[test]
fn one_alert_per_stall() {
    let bus = Arc::new(RecordingBus::new());
    let baseline = Baseline::new();
    let dog = watchdog(&bus, &baseline);
    let t0 = Instant::now();
    baseline.touch_at(t0);

    assert!(!dog.check_at(t0 + Duration::from_secs(20)));
    assert!(dog.check_at(t0 + Duration::from_secs(40)));
    assert!(!dog.check_at(t0 + Duration::from_secs(50)));
    assert!(!dog.check_at(t0 + Duration::from_secs(120)));

    assert_eq!(
        bus.published(&topics::security("banc2")),
        vec!["Timeout BMS banc2".to_string()]
    );
}

#[test]
fn telemetry_rearms_the_watchdog() {
    let bus = Arc::new(RecordingBus::new());
    let baseline = Baseline::new();
    let dog = watchdog(&bus, &baseline);
    let t0 = Instant::now();
    baseline.touch_at(t0);

    assert!(dog.check_at(t0 + Duration::from_secs(31)));
    baseline.touch_at(t0 + Duration::from_secs(60));
    assert!(!dog.check_at(t0 + Duration::from_secs(80)));
    assert!(dog.check_at(t0 + Duration::from_secs(95)));
    assert_eq!(bus.published(&topics::security("banc2")).len(), 2);
}

#[test]
fn unarmed_watchdog_stays_quiet() {
    let bus = Arc::new(RecordingBus::new());
    let dog = watchdog(&bus, &Baseline::new());
    assert!(!dog.check());
    assert!(bus.actions().is_empty());
}

#[test]
fn spawned_thread_stops_on_request() {
    let bus = Arc::new(RecordingBus::new());
    let mut handle = watchdog(&bus, &Baseline::new()).spawn();
    assert!(handle.is_running());
    handle.stop();
    assert!(!handle.is_running());
}
