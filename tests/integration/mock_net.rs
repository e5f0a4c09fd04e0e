//! Scripted network mocks for integration tests.
//!
//! A [`ScriptedConnection`] replays pre-recorded client bytes and copies
//! everything the device writes into a shared [`Wire`] so the test can
//! inspect it after the server has dropped the connection.  Listeners and
//! binders hand those connections out in order.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{SocketAddr, SocketAddrV4};
use std::rc::Rc;

use remote_control::adapters::tls_transport::TlsTransportError;
use remote_control::app::ports::{Broadcaster, ListenerFactory};
use remote_control::config::{RemoteControlSettings, TlsIdentity};
use remote_control::error::{Error, Result};
use remote_control::rpc::codec::{ActionMap, ResponseMap, TERMINATOR};
use remote_control::rpc::response::RESULT_KEY;
use remote_control::rpc::transport::{Listener, Transport};

// ── Frames ────────────────────────────────────────────────────

pub fn frame(pairs: &[(&str, &str)]) -> Vec<u8> {
    let map = ActionMap::from_pairs(pairs);
    let mut out = vec![0u8; map.encoded_len()];
    let n = map.serialize(&mut out).expect("frame fits");
    out.truncate(n);
    out
}

pub fn login(user: &str, pass: &str) -> Vec<u8> {
    frame(&[("username", user), ("password", pass)])
}

/// Credential frame plus one request frame, as a client would send them.
pub fn session_bytes(request: &[(&str, &str)]) -> Vec<u8> {
    let mut bytes = login("admin", "password");
    bytes.extend(frame(request));
    bytes
}

/// The `result` value of every response frame in `bytes`.
pub fn results(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == TERMINATOR)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let mut framed = chunk.to_vec();
            framed.push(TERMINATOR);
            ResponseMap::decode(&framed)
                .get_str(RESULT_KEY)
                .unwrap_or("")
                .to_owned()
        })
        .collect()
}

// ── Wire ──────────────────────────────────────────────────────

/// Device-to-client bytes of one connection, plus whether it was closed.
#[derive(Clone, Default)]
pub struct Wire(Rc<RefCell<(Vec<u8>, bool)>>);

impl Wire {
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().0.clone()
    }

    pub fn results(&self) -> Vec<String> {
        results(&self.0.borrow().0)
    }

    pub fn closed(&self) -> bool {
        self.0.borrow().1
    }
}

// ── Connection ────────────────────────────────────────────────

pub struct ScriptedConnection {
    inbound: VecDeque<u8>,
    wire: Wire,
    peer: SocketAddr,
}

impl ScriptedConnection {
    pub fn new(inbound: &[u8]) -> (Self, Wire) {
        let wire = Wire::default();
        let conn = Self {
            inbound: inbound.iter().copied().collect(),
            wire: wire.clone(),
            peer: SocketAddr::from(([192, 168, 4, 2], 50_000)),
        };
        (conn, wire)
    }
}

impl Transport for ScriptedConnection {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, ()> {
        if self.wire.closed() {
            return Err(());
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> core::result::Result<usize, ()> {
        if self.wire.closed() {
            return Err(());
        }
        self.wire.0.borrow_mut().0.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> core::result::Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.wire.closed()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn close(&mut self) {
        self.wire.0.borrow_mut().1 = true;
    }
}

// ── Listener ──────────────────────────────────────────────────

/// Hands out its connections one per accept, then reports itself closed.
#[derive(Default)]
pub struct ScriptedListener {
    pending: VecDeque<ScriptedConnection>,
}

impl ScriptedListener {
    pub fn new(connections: Vec<ScriptedConnection>) -> Self {
        Self {
            pending: connections.into(),
        }
    }
}

impl Listener for ScriptedListener {
    type Connection = ScriptedConnection;

    fn accept(&mut self) -> Option<ScriptedConnection> {
        self.pending.pop_front()
    }

    fn is_open(&self) -> bool {
        !self.pending.is_empty()
    }
}

// ── Binder ────────────────────────────────────────────────────

/// Queue of listeners to return from successive `bind` calls.  An empty
/// queue or a queued `None` fails the bind.
#[derive(Clone, Default)]
pub struct ScriptedBinder {
    queue: Rc<RefCell<VecDeque<Option<ScriptedListener>>>>,
    ports: Rc<RefCell<Vec<u16>>>,
}

impl ScriptedBinder {
    pub fn push(&self, listener: ScriptedListener) {
        self.queue.borrow_mut().push_back(Some(listener));
    }

    pub fn push_failure(&self) {
        self.queue.borrow_mut().push_back(None);
    }

    /// Ports requested so far, in order.
    pub fn ports(&self) -> Vec<u16> {
        self.ports.borrow().clone()
    }
}

impl ListenerFactory for ScriptedBinder {
    type Listener = ScriptedListener;

    fn bind(&mut self, port: u16, _identity: &TlsIdentity) -> Result<ScriptedListener> {
        self.ports.borrow_mut().push(port);
        self.queue
            .borrow_mut()
            .pop_front()
            .flatten()
            .ok_or(Error::Tls(TlsTransportError::Io))
    }
}

// ── Broadcaster ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    sent: Rc<RefCell<Vec<(SocketAddrV4, Vec<u8>)>>>,
}

impl RecordingBroadcaster {
    pub fn sent(&self) -> Vec<(SocketAddrV4, Vec<u8>)> {
        self.sent.borrow().clone()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&mut self, target: SocketAddrV4, payload: &[u8]) -> bool {
        self.sent.borrow_mut().push((target, payload.to_vec()));
        true
    }
}

// ── Settings ──────────────────────────────────────────────────

/// Defaults with short timeouts and distinct ports for the two servers.
pub fn fast_settings() -> RemoteControlSettings {
    let mut s = RemoteControlSettings::default();
    s.access_point.port = 4443;
    s.access_point.timeout_ms = 150;
    s.command_server.port = 5443;
    s.command_server.timeout_ms = 150;
    s.command_server.join_timeout_secs = 1;
    s
}
