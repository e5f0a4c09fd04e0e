//! End-to-end check of the host TLS listener: a rustls client talks to the
//! command server over a real loopback socket, with a certificate minted
//! by rcgen for the run.

#![cfg(not(target_os = "espidf"))]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use remote_control::adapters::tls_transport::{TlsConnection, TlsListener, TlsTransportError};
use remote_control::app::command_server::{CommandServer, ServeOutcome};
use remote_control::app::ports::Broadcaster;
use remote_control::config::{CommandServerSettings, TlsIdentity};
use remote_control::rpc::auth::AuthenticationGate;
use remote_control::rpc::codec::{ActionMap, ResponseMap, TERMINATOR};
use remote_control::rpc::response::{self, RESULT_KEY};
use remote_control::rpc::transport::{Listener, Transport};

struct NoBroadcast;

impl Broadcaster for NoBroadcast {
    fn broadcast(&mut self, _target: std::net::SocketAddrV4, _payload: &[u8]) -> bool {
        true
    }
}

fn identity() -> (TlsIdentity, rustls::pki_types::CertificateDer<'static>) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let identity = TlsIdentity {
        certificate_pem: cert.pem(),
        private_key_pem: key_pair.serialize_pem(),
    };
    (identity, cert.der().clone())
}

fn frame(pairs: &[(&str, &str)]) -> Vec<u8> {
    let map = ActionMap::from_pairs(pairs);
    let mut out = vec![0u8; map.encoded_len()];
    map.serialize(&mut out).unwrap();
    out
}

/// Connect, send credentials and (unless empty) one request, and collect
/// the `result` of every response frame until the server hangs up.
fn client(addr: SocketAddr, root: rustls::pki_types::CertificateDer<'static>, request: &[(&str, &str)]) -> Vec<String> {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(root).unwrap();
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
    let conn = rustls::ClientConnection::new(Arc::new(config), name).unwrap();

    let sock = TcpStream::connect(addr).unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut tls = rustls::StreamOwned::new(conn, sock);

    let mut bytes = frame(&[("username", "admin"), ("password", "password")]);
    if !request.is_empty() {
        bytes.extend(frame(request));
    }
    tls.write_all(&bytes).unwrap();
    tls.flush().unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        match tls.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }

    received
        .split(|&b| b == TERMINATOR)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let mut framed = chunk.to_vec();
            framed.push(TERMINATOR);
            ResponseMap::decode(&framed).get_str(RESULT_KEY).unwrap_or("").to_owned()
        })
        .collect()
}

fn loopback(listener: &TlsListener) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], listener.local_addr().unwrap().port()))
}

#[test]
fn command_round_trip_over_tls() {
    let (identity, root) = identity();
    let mut listener = TlsListener::bind(0, &identity).unwrap();
    let addr = loopback(&listener);

    let settings = CommandServerSettings::default();
    let mut server: CommandServer<TlsConnection, 2> = CommandServer::new(&settings).unwrap();
    server.register_action("forget", |_: &ActionMap, conn: &mut TlsConnection| {
        response::reply(conn, true);
        true
    });

    let handle = thread::spawn(move || client(addr, root, &[("action", "forget")]));
    let outcome = server.serve(&mut listener, &mut NoBroadcast, None);

    assert_eq!(outcome, ServeOutcome::Terminated);
    assert_eq!(handle.join().unwrap(), ["ok", "ok"]);
}

#[test]
fn wrong_credentials_are_refused_over_tls() {
    let (identity, root) = identity();
    let mut listener = TlsListener::bind(0, &identity).unwrap();
    let addr = loopback(&listener);

    let settings = CommandServerSettings {
        auth_password: "another-secret".into(),
        ..Default::default()
    };
    let gate = AuthenticationGate::new(
        &settings.auth_username,
        &settings.auth_password,
        Duration::from_secs(5),
    )
    .unwrap();

    let handle = thread::spawn(move || client(addr, root, &[]));

    let mut conn = loop {
        if let Some(conn) = listener.accept() {
            break conn;
        }
        thread::sleep(Duration::from_millis(10));
    };
    assert!(!gate.authenticate(&mut conn));
    conn.close();

    assert_eq!(handle.join().unwrap(), ["error"]);
}

#[test]
fn unusable_identity_is_rejected() {
    let identity = TlsIdentity {
        certificate_pem: "not a certificate".into(),
        private_key_pem: String::new(),
    };
    assert!(matches!(
        TlsListener::bind(0, &identity),
        Err(TlsTransportError::InvalidIdentity)
    ));
}
