// CLASSIFICATION: COMMUNITY
// Filename: lifecycle_flow.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

mod common;

use banc_control::bus::{topics, BusAction, Delivery};
use banc_control::lifecycle::{PRINTER_CHECK_ALERT, PRINTER_INACTIVE_ALERT};
use banc_control::store::StationStatus;
use banc_control::Step;
use common::{bench, bench_with, SERIAL, STATION};
use serde_json::Value;
use std::fs;

fn set_occupied(b: &common::Bench) {
    assert!(b
        .registry()
        .set_status(STATION, StationStatus::Occupied, Some(SERIAL), Some(1)));
}

#[test]
fn running_steps_update_record_and_registry() {
    let mut b = bench();
    set_occupied(&b);
    for step in 1..=4u8 {
        assert!(b.step(&format!("{step}\n")).is_none());
        assert_eq!(b.router.records().load().unwrap().current_step, step);
        assert_eq!(b.entry().current_step, Some(step));
    }
    assert_eq!(b.router.step(), Step::FinalCharge);
    assert_eq!(b.entry().status, StationStatus::Occupied);
}

#[test]
fn invalid_steps_write_nothing() {
    let mut b = bench();
    set_occupied(&b);
    b.step("2");
    let record = fs::read(b.router.records().path()).unwrap();
    let registry = fs::read(&b.config.paths.registry).unwrap();

    for payload in ["0", "10", "-3", "abc", "", "2.0"] {
        assert!(b.step(payload).is_none());
    }

    assert_eq!(fs::read(b.router.records().path()).unwrap(), record);
    assert_eq!(fs::read(&b.config.paths.registry).unwrap(), registry);
    assert_eq!(b.router.step(), Step::Charge);
}

#[test]
fn completion_hands_off_to_printer() {
    let mut b = bench();
    set_occupied(&b);
    b.step("4");
    let terminal = b.step("5").expect("terminal");
    assert_eq!(terminal.step, Step::Completed);
    assert!(terminal.effects.settle);

    assert_eq!(b.router.records().load().unwrap().current_step, 5);
    let entry = b.entry();
    assert_eq!(entry.status, StationStatus::Available);
    assert_eq!(entry.serial_pending, None);
    assert_eq!(entry.current_step, None);

    let handoff = b.bus.published(topics::PRINTER_TEST_DONE);
    assert_eq!(handoff.len(), 1);
    let body: Value = serde_json::from_str(&handoff[0]).unwrap();
    assert_eq!(body["serial_number"], SERIAL);
    assert!(body["timestamp_test_done"].as_str().is_some());

    assert!(!b.router.log().is_open());
    assert!(b
        .bus
        .actions()
        .contains(&BusAction::Unsubscribe(topics::bms_data(STATION))));
}

#[test]
fn completion_without_printer_raises_alert() {
    let mut b = bench_with(Ok(false), |_| {});
    set_occupied(&b);
    assert!(b.step("5").is_some());
    assert!(b.bus.published(topics::PRINTER_TEST_DONE).is_empty());
    assert_eq!(
        b.bus.published(&topics::security(STATION)),
        vec![PRINTER_INACTIVE_ALERT.to_string()]
    );
    assert_eq!(b.entry().status, StationStatus::Available);
    assert!(b.bus.actions().contains(&BusAction::Publish {
        topic: topics::security(STATION),
        payload: PRINTER_INACTIVE_ALERT.to_string(),
        delivery: Delivery::AtLeastOnce,
    }));
}

#[test]
fn probe_failure_raises_check_alert() {
    let mut b = bench_with(Err("no /proc".into()), |_| {});
    assert!(b.step("5").is_some());
    assert_eq!(
        b.bus.published(&topics::security(STATION)),
        vec![PRINTER_CHECK_ALERT.to_string()]
    );
    assert!(b.bus.actions().contains(&BusAction::Publish {
        topic: topics::security(STATION),
        payload: PRINTER_CHECK_ALERT.to_string(),
        delivery: Delivery::AtLeastOnce,
    }));
}

#[test]
fn failure_archives_test_directory() {
    let mut b = bench();
    set_occupied(&b);
    b.step("3");
    b.bms("51.2,10.5,78,25.3,4,3350,9,3190,120.4,1500.2");
    let live_dir = b.test_dir();
    let name = live_dir.file_name().unwrap().to_owned();

    let terminal = b.step("6").expect("terminal");
    assert_eq!(terminal.step, Step::Failed);
    assert!(!terminal.effects.settle);

    assert!(!live_dir.exists());
    let archived = b.config.paths.archive_root.join(&name);
    assert!(archived.join("config.json").is_file());
    let csv = fs::read_to_string(archived.join("data.csv")).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert_eq!(b.entry().status, StationStatus::Available);
    assert!(b.bus.published(topics::PRINTER_TEST_DONE).is_empty());
}

#[test]
fn stops_keep_registry_for_resume() {
    for code in ["7", "8", "9"] {
        let mut b = bench();
        set_occupied(&b);
        b.step("3");
        let before = fs::read(&b.config.paths.registry).unwrap();
        let terminal = b.step(code).expect("terminal");
        assert!(terminal.effects.disconnect && terminal.effects.exit);
        assert_eq!(fs::read(&b.config.paths.registry).unwrap(), before);
        assert_eq!(b.router.records().load().unwrap().current_step, 3);
        assert!(!b.router.log().is_open());
        assert!(b.test_dir().is_dir());
    }
}

#[test]
fn nothing_is_applied_after_terminal() {
    let mut b = bench();
    assert!(b.step("9").is_some());
    assert!(b.step("2").is_none());
    assert_eq!(b.router.records().load().unwrap().current_step, 1);
}

#[test]
fn regression_allowed_unless_enforced() {
    let mut b = bench();
    b.step("3");
    b.step("2");
    assert_eq!(b.router.step(), Step::Charge);

    let mut strict = bench_with(Ok(true), |c| c.station.enforce_monotonic_steps = true);
    strict.step("3");
    strict.step("2");
    assert_eq!(strict.router.step(), Step::Discharge);
    assert_eq!(strict.router.records().load().unwrap().current_step, 3);
}

#[test]
fn restart_resumes_existing_test() {
    let mut b = bench();
    b.step("3");
    let dir = b.test_dir();
    drop(b.router);

    let bus = std::sync::Arc::new(banc_control::bus::RecordingBus::new());
    let again = banc_control::router::Router::prepare(
        &b.config,
        STATION,
        SERIAL,
        bus,
        Box::new(banc_control::probe::StaticProbe(Ok(true))),
    )
    .unwrap();
    assert_eq!(again.records().dir(), dir.as_path());
    assert_eq!(again.step(), Step::Discharge);
}
