// CLASSIFICATION: COMMUNITY
// Filename: session_run.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

mod common;

use banc_control::bus::{topics, BusAction, BusError, Delivery, Link, LinkEvent, RecordingBus};
use banc_control::station::SessionError;
use banc_control::store::{RegistryStore, StationStatus};
use banc_control::Session;
use common::{bench, Bench, SERIAL, STATION};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Replays a fixed event sequence, then reports the link as closed.
struct ScriptedLink {
    events: VecDeque<Result<LinkEvent, BusError>>,
    subscribed: Arc<Mutex<Vec<String>>>,
}

impl Link for ScriptedLink {
    fn poll(&mut self, _timeout: Duration) -> Result<LinkEvent, BusError> {
        self.events.pop_front().unwrap_or(Ok(LinkEvent::Closed))
    }

    fn subscribe(&self, topic: &str, _delivery: Delivery) -> Result<(), BusError> {
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

fn message(suffix: &str, payload: &str) -> Result<LinkEvent, BusError> {
    Ok(LinkEvent::Message {
        topic: topics::scoped(STATION, suffix),
        payload: payload.as_bytes().to_vec(),
    })
}

struct Run {
    session: Session,
    bus: Arc<RecordingBus>,
    subscribed: Arc<Mutex<Vec<String>>>,
    bench_registry: RegistryStore,
    _root: TempDir,
}

fn session(events: Vec<Result<LinkEvent, BusError>>) -> Run {
    let b = bench();
    let registry = b.registry();
    let Bench {
        root,
        config,
        bus,
        router,
    } = b;
    let subscribed = Arc::new(Mutex::new(Vec::new()));
    let link = ScriptedLink {
        events: events.into(),
        subscribed: Arc::clone(&subscribed),
    };
    Run {
        session: Session::assemble(config, router, Box::new(link)),
        bus,
        subscribed,
        bench_registry: registry,
        _root: root,
    }
}

#[test]
fn completion_runs_the_exit_sequence() {
    let mut run = session(vec![
        Ok(LinkEvent::Connected),
        message("step", "4"),
        Ok(LinkEvent::Connected),
        message("bms/data", "51.2,10.5,78,25.3,4,3350,9,3190,120.4,1500.2"),
        message("step", "5"),
    ]);
    assert!(run.session.watchdog_running());

    assert_eq!(run.session.run().unwrap(), 0);

    let commands = run.bus.published(&topics::command(STATION));
    assert_eq!(commands.len(), 1);
    let startup: Value = serde_json::from_str(&commands[0]).unwrap();
    assert_eq!(startup["current_step"], 1);
    assert_eq!(run.subscribed.lock().unwrap().len(), 6);

    let actions = run.bus.actions();
    assert_eq!(actions.last(), Some(&BusAction::Disconnect));
    let handoff = run.bus.published(topics::PRINTER_TEST_DONE);
    assert_eq!(handoff.len(), 1);
    assert!(handoff[0].contains(SERIAL));

    assert!(!run.session.router().log().is_open());
    assert!(!run.session.watchdog_running());
    assert_eq!(run.session.router().records().load().unwrap().current_step, 5);
    assert_eq!(
        run.bench_registry.entry(STATION).unwrap().status,
        StationStatus::Available
    );
}

#[test]
fn messages_after_terminal_are_dropped() {
    let mut run = session(vec![
        Ok(LinkEvent::Connected),
        message("step", "9"),
        message("step", "2"),
    ]);
    assert_eq!(run.session.run().unwrap(), 0);
    assert_eq!(run.session.router().records().load().unwrap().current_step, 1);
    assert_eq!(run.bus.actions().last(), Some(&BusAction::Disconnect));
    assert!(!run.session.watchdog_running());
}

#[test]
fn connect_failure_is_fatal() {
    let mut run = session(vec![Err(BusError::Disconnected)]);
    assert!(matches!(run.session.run(), Err(SessionError::Bus(_))));
    assert!(run.bus.published(&topics::command(STATION)).is_empty());
}

#[test]
fn refused_connection_is_fatal() {
    let mut run = session(vec![Ok(LinkEvent::Refused("NotAuthorized".into()))]);
    assert!(matches!(run.session.run(), Err(SessionError::Refused(_))));
}

#[test]
fn errors_after_connect_are_retried() {
    let mut run = session(vec![
        Ok(LinkEvent::Connected),
        Err(BusError::Disconnected),
        Ok(LinkEvent::Connected),
        message("step", "8"),
    ]);
    assert_eq!(run.session.run().unwrap(), 0);
    assert_eq!(run.bus.published(&topics::command(STATION)).len(), 1);
    assert_eq!(run.subscribed.lock().unwrap().len(), 6);
}
