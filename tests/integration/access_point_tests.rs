//! Provisioning server on the fallback access point, persisting through
//! the real credential store.

use remote_control::adapters::credentials::CredentialStore;
use remote_control::adapters::nvs::NvsAdapter;
use remote_control::app::access_point_server::AccessPointServer;
use remote_control::app::command_server::ServeOutcome;
use remote_control::app::ports::CredentialPort;
use remote_control::config::AccessPointSettings;

use crate::mock_net::{ScriptedConnection, ScriptedListener, Wire, session_bytes};

fn server() -> AccessPointServer {
    let settings = AccessPointSettings {
        timeout_ms: 150,
        ..Default::default()
    };
    AccessPointServer::new(&settings).unwrap()
}

fn run(sessions: &[Vec<u8>], creds: &mut CredentialStore<NvsAdapter>) -> (ServeOutcome, Vec<Wire>) {
    let (conns, wires): (Vec<_>, Vec<_>) = sessions.iter().map(|s| ScriptedConnection::new(s)).unzip();
    let mut listener = ScriptedListener::new(conns);
    (server().serve(&mut listener, creds), wires)
}

fn setwifi(bssid: &str, password: &str) -> Vec<u8> {
    session_bytes(&[("action", "setwifi"), ("bssid", bssid), ("password", password)])
}

#[test]
fn setwifi_persists_and_terminates() {
    let mut creds = CredentialStore::new(NvsAdapter::new());
    let (outcome, wires) = run(&[setwifi("Office", "correct-horse")], &mut creds);

    assert_eq!(outcome, ServeOutcome::Terminated);
    assert_eq!(wires[0].results(), ["ok", "ok"]);

    let reopened = CredentialStore::new(creds.into_storage());
    assert_eq!(reopened.id(), "Office");
    assert_eq!(reopened.pass(), "correct-horse");
}

#[test]
fn open_network_is_accepted() {
    let mut creds = CredentialStore::new(NvsAdapter::new());
    let (outcome, _) = run(&[setwifi("Cafe", "")], &mut creds);
    assert_eq!(outcome, ServeOutcome::Terminated);
    assert!(creds.is_valid());
    assert_eq!(creds.pass(), "");
}

#[test]
fn missing_password_is_an_error_and_serving_continues() {
    let mut creds = CredentialStore::new(NvsAdapter::new());
    let (outcome, wires) = run(
        &[
            session_bytes(&[("action", "setwifi"), ("bssid", "Office")]),
            setwifi("Office", "correct-horse"),
        ],
        &mut creds,
    );

    assert_eq!(outcome, ServeOutcome::Terminated);
    assert_eq!(wires[0].results(), ["ok", "error"]);
    assert_eq!(wires[1].results(), ["ok", "ok"]);
}

#[test]
fn unknown_action_is_an_error() {
    let mut creds = CredentialStore::new(NvsAdapter::new());
    let (outcome, wires) = run(&[session_bytes(&[("action", "setpin"), ("level", "1")])], &mut creds);
    assert_eq!(outcome, ServeOutcome::ListenerClosed);
    assert_eq!(wires[0].results(), ["ok", "error"]);
    assert!(!creds.is_valid());
}

#[test]
fn storage_failure_is_an_error() {
    let mut creds = CredentialStore::new(NvsAdapter::new());
    creds.storage_mut().set_fail_writes(true);
    let (outcome, wires) = run(&[setwifi("Office", "correct-horse")], &mut creds);
    assert_eq!(outcome, ServeOutcome::ListenerClosed);
    assert_eq!(wires[0].results(), ["ok", "error"]);
    assert!(!creds.is_valid());
}

#[test]
fn oversized_bssid_cannot_be_sent() {
    // Fields over 255 bytes never reach the wire: the frame drops them.
    let mut creds = CredentialStore::new(NvsAdapter::new());
    let long = "n".repeat(300);
    let (_, wires) = run(&[setwifi(&long, "correct-horse")], &mut creds);
    assert_eq!(wires[0].results(), ["ok", "error"]);
}
