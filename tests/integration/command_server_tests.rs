//! Command server against scripted connections: authentication, dispatch,
//! observers and the discovery beacon.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use remote_control::app::command_server::{CommandServer, ServeOutcome};
use remote_control::config::CommandServerSettings;
use remote_control::rpc::codec::ActionMap;
use remote_control::rpc::response;

use crate::mock_net::{
    RecordingBroadcaster, ScriptedConnection, ScriptedListener, Wire, login, session_bytes,
};

type Server = CommandServer<ScriptedConnection, 4>;

fn server() -> Server {
    let settings = CommandServerSettings {
        timeout_ms: 150,
        ..Default::default()
    };
    let mut srv = Server::new(&settings).unwrap();
    srv.register_action("setpin", |req: &ActionMap, conn: &mut ScriptedConnection| {
        response::reply(conn, req.get_str("level").is_some());
        false
    });
    srv.register_action("forget", |_: &ActionMap, conn: &mut ScriptedConnection| {
        response::reply(conn, true);
        true
    });
    srv
}

fn listener(sessions: &[Vec<u8>]) -> (ScriptedListener, Vec<Wire>) {
    let (conns, wires): (Vec<_>, Vec<_>) = sessions.iter().map(|s| ScriptedConnection::new(s)).unzip();
    (ScriptedListener::new(conns), wires)
}

#[test]
fn action_reply_follows_auth_reply() {
    let mut srv = server();
    let (mut l, wires) = listener(&[session_bytes(&[("action", "setpin"), ("level", "1")])]);
    let outcome = srv.serve(&mut l, &mut RecordingBroadcaster::default(), None);

    assert_eq!(outcome, ServeOutcome::ListenerClosed);
    assert_eq!(wires[0].results(), ["ok", "ok"]);
    assert!(wires[0].closed());
}

#[test]
fn handler_decides_its_own_reply() {
    let mut srv = server();
    let (mut l, wires) = listener(&[session_bytes(&[("action", "setpin")])]);
    srv.serve(&mut l, &mut RecordingBroadcaster::default(), None);
    assert_eq!(wires[0].results(), ["ok", "error"]);
}

#[test]
fn wrong_password_skips_dispatch() {
    let mut srv = server();
    let mut bytes = login("admin", "nope");
    bytes.extend(session_bytes(&[("action", "forget")]));
    let (mut l, wires) = listener(&[bytes]);

    let outcome = srv.serve(&mut l, &mut RecordingBroadcaster::default(), None);
    assert_eq!(outcome, ServeOutcome::ListenerClosed);
    assert_eq!(wires[0].results(), ["error"]);
    assert!(wires[0].closed());
}

#[test]
fn unknown_action_gets_no_reply_and_serving_continues() {
    let mut srv = server();
    let (mut l, wires) = listener(&[
        session_bytes(&[("action", "reboot")]),
        session_bytes(&[("action", "forget")]),
    ]);

    let outcome = srv.serve(&mut l, &mut RecordingBroadcaster::default(), None);
    assert_eq!(outcome, ServeOutcome::Terminated);
    assert_eq!(wires[0].results(), ["ok"]);
    assert_eq!(wires[1].results(), ["ok", "ok"]);
}

#[test]
fn terminating_action_stops_before_later_clients() {
    let mut srv = server();
    let (mut l, wires) = listener(&[
        session_bytes(&[("action", "forget")]),
        session_bytes(&[("action", "setpin"), ("level", "0")]),
    ]);

    assert_eq!(
        srv.serve(&mut l, &mut RecordingBroadcaster::default(), None),
        ServeOutcome::Terminated
    );
    assert!(wires[0].closed());
    assert!(wires[1].written().is_empty());
}

#[test]
fn observers_fire_in_lifecycle_order() {
    let mut srv = server();
    let log = Rc::new(RefCell::new(Vec::<String>::new()));

    let l1 = Rc::clone(&log);
    let l2 = Rc::clone(&log);
    let l3 = Rc::clone(&log);
    let l4 = Rc::clone(&log);
    let obs = srv.observers_mut();
    obs.on_new_connection = Some(Box::new(move |peer| {
        l1.borrow_mut().push(format!("open {}", peer.map(|p| p.to_string()).unwrap_or_default()));
    }));
    obs.on_server_termination = Some(Box::new(move || l2.borrow_mut().push("terminate".into())));
    obs.on_connection_close = Some(Box::new(move || l3.borrow_mut().push("close".into())));
    obs.on_server_loop = Some(Box::new(move || l4.borrow_mut().push("loop".into())));

    let (mut l, _wires) = listener(&[
        session_bytes(&[("action", "setpin"), ("level", "1")]),
        session_bytes(&[("action", "forget")]),
    ]);
    srv.serve(&mut l, &mut RecordingBroadcaster::default(), None);

    assert_eq!(
        *log.borrow(),
        [
            "open 192.168.4.2:50000",
            "close",
            "loop",
            "open 192.168.4.2:50000",
            "terminate",
            "close",
            "loop",
        ]
    );
}

#[test]
fn beacon_targets_local_broadcast_address() {
    let mut srv = server();
    let broadcaster = RecordingBroadcaster::default();
    let (mut l, _wires) = listener(&[session_bytes(&[("action", "setpin"), ("level", "1")])]);

    srv.serve(&mut l, &mut broadcaster.clone(), Some(Ipv4Addr::new(192, 168, 1, 37)));

    let sent = broadcaster.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 255), 4444));
    assert_eq!(sent[0].1, b"remote-control");
}

#[test]
fn beacon_is_silent_without_an_address() {
    let mut srv = server();
    let broadcaster = RecordingBroadcaster::default();
    let (mut l, _wires) = listener(&[session_bytes(&[("action", "setpin"), ("level", "1")])]);
    srv.serve(&mut l, &mut broadcaster.clone(), None);
    assert!(broadcaster.sent().is_empty());
}

#[test]
fn silent_client_times_out() {
    let mut srv = server();
    let (mut l, wires) = listener(&[Vec::new()]);
    srv.serve(&mut l, &mut RecordingBroadcaster::default(), None);
    assert_eq!(wires[0].results(), ["error"]);
}
