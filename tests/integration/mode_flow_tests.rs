//! Mode machine driven end to end through `RemoteControl::tick`.
//!
//! Uses the simulated `WifiAdapter` and the real credential store over the
//! in-memory NVS backend; only the TLS listeners are scripted.

use std::cell::Cell;
use std::rc::Rc;

use remote_control::RemoteControl;
use remote_control::adapters::credentials::CredentialStore;
use remote_control::adapters::nvs::NvsAdapter;
use remote_control::adapters::wifi::{RadioMode, WifiAdapter};
use remote_control::app::ports::CredentialPort;
use remote_control::fsm::OperatingMode;
use remote_control::rpc::codec::ActionMap;
use remote_control::rpc::response;

use crate::mock_net::{
    RecordingBroadcaster, ScriptedBinder, ScriptedConnection, ScriptedListener, fast_settings, login,
    session_bytes,
};

type Stack = RemoteControl<WifiAdapter, CredentialStore<NvsAdapter>, ScriptedBinder, RecordingBroadcaster, 4>;

fn stack(binder: &ScriptedBinder, credentials: CredentialStore<NvsAdapter>) -> Stack {
    let mut rc = RemoteControl::new(
        fast_settings(),
        WifiAdapter::new(),
        credentials,
        binder.clone(),
        RecordingBroadcaster::default(),
    )
    .unwrap();
    rc.add_action("forget", |_: &ActionMap, conn: &mut ScriptedConnection| {
        response::reply(conn, true);
        true
    });
    rc
}

fn stored(id: &str, pass: &str) -> CredentialStore<NvsAdapter> {
    let mut creds = CredentialStore::new(NvsAdapter::new());
    assert!(creds.update(id, pass));
    creds
}

fn empty() -> CredentialStore<NvsAdapter> {
    CredentialStore::new(NvsAdapter::new())
}

#[test]
fn starts_in_connecting() {
    let rc = stack(&ScriptedBinder::default(), empty());
    assert_eq!(rc.mode(), OperatingMode::Connecting);
}

#[test]
fn no_credentials_falls_back_to_access_point() {
    let mut rc = stack(&ScriptedBinder::default(), empty());
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
}

#[test]
fn valid_credentials_go_operational() {
    let mut rc = stack(&ScriptedBinder::default(), stored("HomeWiFi", "hunter2hunter2"));
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::ConnectedOperational);
}

#[test]
fn provisioning_then_operation_then_forget() {
    let binder = ScriptedBinder::default();
    let (ap_conn, ap_wire) = ScriptedConnection::new(&session_bytes(&[
        ("action", "setwifi"),
        ("bssid", "HomeWiFi"),
        ("password", "hunter2hunter2"),
    ]));
    binder.push(ScriptedListener::new(vec![ap_conn]));
    let (cmd_conn, cmd_wire) = ScriptedConnection::new(&session_bytes(&[("action", "forget")]));
    binder.push(ScriptedListener::new(vec![cmd_conn]));

    let mut rc = stack(&binder, empty());

    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);

    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::Connecting);
    assert_eq!(ap_wire.results(), ["ok", "ok"]);
    assert!(ap_wire.closed());
    assert!(rc.credentials().is_valid());
    assert_eq!(rc.credentials().id(), "HomeWiFi");

    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::ConnectedOperational);

    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
    assert_eq!(cmd_wire.results(), ["ok", "ok"]);
    assert_eq!(binder.ports(), [4443, 5443]);
    assert_eq!(rc.network().mode(), RadioMode::Off);
    assert_eq!(rc.network().sim_joins(), 1);
}

#[test]
fn manual_override_aborts_join() {
    let binder = ScriptedBinder::default();
    let mut rc = stack(&binder, stored("HomeWiFi", "hunter2hunter2"));
    rc.network_mut().set_sim_link(false);

    let polls = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&polls);
    rc.set_manual_override(move || {
        counter.set(counter.get() + 1);
        counter.get() >= 3
    });

    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
    assert_eq!(polls.get(), 3);
    assert!(binder.ports().is_empty());
    assert_eq!(rc.network().mode(), RadioMode::Off);
}

#[test]
fn join_timeout_falls_back() {
    let binder = ScriptedBinder::default();
    let mut rc = stack(&binder, stored("HomeWiFi", "hunter2hunter2"));
    rc.network_mut().set_sim_link(false);

    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
    assert!(binder.ports().is_empty());
    assert_eq!(rc.network().mode(), RadioMode::Off);
}

#[test]
fn unjoinable_stored_network_falls_back() {
    let binder = ScriptedBinder::default();
    // Not printable ASCII: the radio refuses the station configuration.
    let mut rc = stack(&binder, stored("caf\u{e9}", "hunter2hunter2"));
    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
    assert_eq!(rc.network().sim_joins(), 0);
}

#[test]
fn command_server_bind_failure_falls_back() {
    let binder = ScriptedBinder::default();
    binder.push_failure();
    let mut rc = stack(&binder, stored("HomeWiFi", "hunter2hunter2"));

    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
    assert_eq!(binder.ports(), [5443]);
    assert_eq!(rc.network().mode(), RadioMode::Off);
}

#[test]
fn access_point_failure_retries_connecting() {
    let binder = ScriptedBinder::default();
    let mut rc = stack(&binder, empty());
    rc.network_mut().set_sim_access_point(false);

    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::Connecting);
    assert!(binder.ports().is_empty());
}

#[test]
fn access_point_bind_failure_retries_connecting() {
    let binder = ScriptedBinder::default();
    binder.push_failure();
    let mut rc = stack(&binder, empty());

    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::Connecting);
    assert_eq!(binder.ports(), [4443]);
}

#[test]
fn rejected_provisioning_keeps_device_unconfigured() {
    let binder = ScriptedBinder::default();
    let mut bytes = login("admin", "wrong");
    bytes.extend(session_bytes(&[("action", "setwifi")]));
    let (conn, wire) = ScriptedConnection::new(&bytes);
    binder.push(ScriptedListener::new(vec![conn]));

    let mut rc = stack(&binder, empty());
    let loops = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&loops);
    rc.set_on_access_point_loop(move || seen.set(seen.get() + 1));

    rc.tick();
    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::Connecting);
    assert_eq!(wire.results(), ["error"]);
    assert!(wire.closed());
    assert_eq!(loops.get(), 1);

    rc.tick();
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
    assert!(!rc.credentials().is_valid());
}

#[test]
fn force_mode_overrides_current_mode() {
    let mut rc = stack(&ScriptedBinder::default(), empty());
    rc.force_mode(OperatingMode::AccessPointFallback);
    assert_eq!(rc.mode(), OperatingMode::AccessPointFallback);
}
