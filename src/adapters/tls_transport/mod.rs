//! TLS server adapter.
//!
//! [`TlsListener`] implements [`Listener`] and hands out one
//! [`TlsConnection`] (a [`Transport`]) per accepted client.  Both servers
//! present an X.509 certificate and key taken from the settings; there is
//! no plaintext mode.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: lwIP sockets + mbedTLS (see `esp_impl`).
//! - **all other targets**: `std::net` sockets + rustls.
//!
//! ## Connection model
//!
//! 1. `bind()` opens a non-blocking listener on `0.0.0.0:<port>` and loads
//!    the certificate chain and private key from PEM.
//! 2. `accept()` polls; a waiting client is taken through the full TLS
//!    handshake before it is returned.  A failed handshake yields `None`.
//! 3. Reads are non-blocking: `Ok(0)` means nothing has arrived yet.  A
//!    peer that went away reports `NotConnected`.
//! 4. `close()` sends close_notify and shuts the socket.

use core::fmt;
use std::net::SocketAddr;

use log::{info, warn};

use crate::app::ports::ListenerFactory;
use crate::config::TlsIdentity;
use crate::rpc::transport::{Listener, Transport};

#[cfg(not(target_os = "espidf"))]
use std::io::{Read, Write};
#[cfg(not(target_os = "espidf"))]
use std::sync::Arc;
#[cfg(not(target_os = "espidf"))]
use std::time::Duration;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Upper bound on a single handshake (host).
#[cfg(not(target_os = "espidf"))]
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive would-block results tolerated while draining ciphertext.
#[cfg(not(target_os = "espidf"))]
const FLUSH_MAX_STALLS: u32 = 200;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

/// Errors originating from the TLS transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsTransportError {
    /// TCP or socket I/O failure.
    Io,
    /// TLS handshake or session error.
    Tls,
    /// The peer is gone or the connection was closed locally.
    NotConnected,
    /// Certificate or private key could not be parsed.
    InvalidIdentity,
}

impl fmt::Display for TlsTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "TCP/socket I/O error"),
            Self::Tls => write!(f, "TLS handshake or session error"),
            Self::NotConnected => write!(f, "connection closed"),
            Self::InvalidIdentity => write!(f, "certificate or private key unreadable"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF platform helpers (real lwIP + mbedTLS)
// ───────────────────────────────────────────────────────────────
#[cfg(target_os = "espidf")]
mod esp_impl;

// ───────────────────────────────────────────────────────────────
// Host helpers (rustls)
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
fn server_config(identity: &TlsIdentity) -> Result<Arc<rustls::ServerConfig>, TlsTransportError> {
    let certs = rustls_pemfile::certs(&mut identity.certificate_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| TlsTransportError::InvalidIdentity)?;
    if certs.is_empty() {
        warn!("TLS(host): no certificate in PEM");
        return Err(TlsTransportError::InvalidIdentity);
    }
    let key = rustls_pemfile::private_key(&mut identity.private_key_pem.as_bytes())
        .map_err(|_| TlsTransportError::InvalidIdentity)?
        .ok_or(TlsTransportError::InvalidIdentity)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|_| TlsTransportError::Tls)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| {
            warn!("TLS(host): certificate rejected: {e}");
            TlsTransportError::InvalidIdentity
        })?;
    Ok(Arc::new(config))
}

/// Push buffered ciphertext to the socket, waiting out short stalls.
#[cfg(not(target_os = "espidf"))]
fn write_pending(
    conn: &mut rustls::ServerConnection,
    sock: &mut std::net::TcpStream,
) -> Result<(), TlsTransportError> {
    let mut stalls = 0;
    while conn.wants_write() {
        match conn.write_tls(sock) {
            Ok(_) => stalls = 0,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                stalls += 1;
                if stalls >= FLUSH_MAX_STALLS {
                    warn!("TLS(host): socket not draining, giving up");
                    return Err(TlsTransportError::Io);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(_) => return Err(TlsTransportError::Io),
        }
    }
    Ok(())
}

/// Live rustls session over a non-blocking socket.
#[cfg(not(target_os = "espidf"))]
struct HostSession {
    conn: rustls::ServerConnection,
    sock: std::net::TcpStream,
    /// Socket reported end-of-stream.
    eof: bool,
}

// ───────────────────────────────────────────────────────────────
// TlsListener
// ───────────────────────────────────────────────────────────────

/// Non-blocking TLS listener on `0.0.0.0:<port>`.
pub struct TlsListener {
    port: u16,

    // ── ESP-IDF fields ──────────────────────────────────────────
    #[cfg(target_os = "espidf")]
    server: std::rc::Rc<esp_impl::EspTlsServer>,

    // ── Host fields ─────────────────────────────────────────────
    #[cfg(not(target_os = "espidf"))]
    listener: std::net::TcpListener,
    #[cfg(not(target_os = "espidf"))]
    config: Arc<rustls::ServerConfig>,
}

impl TlsListener {
    /// Bind and load `identity`.  Pass port `0` on the host to let the OS
    /// pick (see [`local_addr`](Self::local_addr)).
    #[cfg(target_os = "espidf")]
    pub fn bind(port: u16, identity: &TlsIdentity) -> Result<Self, TlsTransportError> {
        let server = esp_impl::esp_new(
            port,
            identity.certificate_pem.as_bytes(),
            identity.private_key_pem.as_bytes(),
        )?;
        Ok(Self {
            port,
            server: std::rc::Rc::new(server),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn bind(port: u16, identity: &TlsIdentity) -> Result<Self, TlsTransportError> {
        let config = server_config(identity)?;

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = std::net::TcpListener::bind(addr).map_err(|e| {
            warn!("TLS(host): bind {addr} failed: {e}");
            TlsTransportError::Io
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|_| TlsTransportError::Io)?;

        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        info!("TLS(host): listening on port {port}");
        Ok(Self {
            port,
            listener,
            config,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The actual bound address (host only).
    #[cfg(not(target_os = "espidf"))]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    // ── Platform helpers: accept ──────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_accept(&mut self) -> Option<TlsConnection> {
        let (client, peer) = esp_impl::esp_accept(&self.server)?;
        Some(TlsConnection {
            peer,
            client: Some(client),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_accept(&mut self) -> Option<TlsConnection> {
        let (mut sock, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return None,
            Err(e) => {
                warn!("TLS(host): accept error: {e}");
                return None;
            }
        };

        // Handshake in blocking mode under a deadline, then go non-blocking.
        let prepared = sock
            .set_nonblocking(false)
            .and_then(|_| sock.set_read_timeout(Some(HANDSHAKE_TIMEOUT)))
            .and_then(|_| sock.set_write_timeout(Some(HANDSHAKE_TIMEOUT)));
        if prepared.is_err() {
            warn!("TLS(host): could not configure client socket");
            return None;
        }

        let mut conn = match rustls::ServerConnection::new(self.config.clone()) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("TLS(host): session setup failed: {e}");
                return None;
            }
        };
        while conn.is_handshaking() {
            if let Err(e) = conn.complete_io(&mut sock) {
                warn!("TLS(host): handshake with {peer} failed: {e}");
                return None;
            }
        }
        if sock.set_nonblocking(true).is_err() {
            warn!("TLS(host): failed to set non-blocking on client socket");
            return None;
        }

        info!("TLS(host): handshake complete with {peer}");
        Some(TlsConnection {
            peer: Some(peer),
            session: Some(HostSession {
                conn,
                sock,
                eof: false,
            }),
        })
    }
}

impl Listener for TlsListener {
    type Connection = TlsConnection;

    fn accept(&mut self) -> Option<TlsConnection> {
        self.platform_accept()
    }
}

// ───────────────────────────────────────────────────────────────
// TlsConnection
// ───────────────────────────────────────────────────────────────

/// One accepted, handshaken client.
pub struct TlsConnection {
    peer: Option<SocketAddr>,

    #[cfg(target_os = "espidf")]
    client: Option<esp_impl::EspTlsClient>,

    #[cfg(not(target_os = "espidf"))]
    session: Option<HostSession>,
}

impl TlsConnection {
    // ── Platform helpers: read ────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_read(&mut self, buf: &mut [u8]) -> Result<usize, TlsTransportError> {
        let client = self.client.as_mut().ok_or(TlsTransportError::NotConnected)?;
        let result = esp_impl::esp_read(client, buf);
        if result.is_err() {
            self.client.take();
        }
        result
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read(&mut self, buf: &mut [u8]) -> Result<usize, TlsTransportError> {
        let s = self.session.as_mut().ok_or(TlsTransportError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        if !s.eof {
            match s.conn.read_tls(&mut s.sock) {
                Ok(0) => s.eof = true,
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => {
                    self.session = None;
                    return Err(TlsTransportError::Io);
                }
            }
            if let Err(e) = s.conn.process_new_packets() {
                warn!("TLS(host): bad record from peer: {e}");
                // Queue the alert for the peer before dropping the session.
                let _ = write_pending(&mut s.conn, &mut s.sock);
                self.session = None;
                return Err(TlsTransportError::Tls);
            }
        }

        let read = s.conn.reader().read(buf);
        match read {
            Ok(0) => {
                info!("TLS(host): peer closed the connection");
                self.session = None;
                Err(TlsTransportError::NotConnected)
            }
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if s.eof {
                    self.session = None;
                    Err(TlsTransportError::NotConnected)
                } else {
                    Ok(0)
                }
            }
            Err(_) => {
                self.session = None;
                Err(TlsTransportError::NotConnected)
            }
        }
    }

    // ── Platform helpers: write ───────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_write(&mut self, data: &[u8]) -> Result<usize, TlsTransportError> {
        let client = self.client.as_mut().ok_or(TlsTransportError::NotConnected)?;
        let result = esp_impl::esp_write(client, data);
        if result.is_err() {
            self.client.take();
        }
        result
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_write(&mut self, data: &[u8]) -> Result<usize, TlsTransportError> {
        let s = self.session.as_mut().ok_or(TlsTransportError::NotConnected)?;
        let n = s.conn.writer().write(data).map_err(|_| TlsTransportError::Tls)?;
        if let Err(e) = write_pending(&mut s.conn, &mut s.sock) {
            self.session = None;
            return Err(e);
        }
        Ok(n)
    }

    // ── Platform helpers: flush ───────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_flush(&mut self) -> Result<(), TlsTransportError> {
        // mbedTLS writes whole records straight to the socket.
        if self.client.is_some() {
            Ok(())
        } else {
            Err(TlsTransportError::NotConnected)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_flush(&mut self) -> Result<(), TlsTransportError> {
        let s = self.session.as_mut().ok_or(TlsTransportError::NotConnected)?;
        write_pending(&mut s.conn, &mut s.sock)?;
        s.sock.flush().map_err(|_| TlsTransportError::Io)
    }

    // ── Platform helpers: close ───────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_close(&mut self) {
        // EspTlsClient::drop() sends close_notify, frees the session and
        // closes the socket.
        if self.client.take().is_some() {
            info!("TLS(espidf): client disconnected");
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close(&mut self) {
        if let Some(mut s) = self.session.take() {
            s.conn.send_close_notify();
            let _ = write_pending(&mut s.conn, &mut s.sock);
            let _ = s.sock.shutdown(std::net::Shutdown::Both);
            info!("TLS(host): client disconnected");
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_open(&self) -> bool {
        self.client.is_some()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_open(&self) -> bool {
        self.session.is_some()
    }
}

impl Transport for TlsConnection {
    type Error = TlsTransportError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TlsTransportError> {
        self.platform_read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TlsTransportError> {
        self.platform_write(data)
    }

    fn flush(&mut self) -> Result<(), TlsTransportError> {
        self.platform_flush()
    }

    fn available(&self) -> bool {
        self.platform_open()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn close(&mut self) {
        self.platform_close();
    }
}

impl Drop for TlsConnection {
    fn drop(&mut self) {
        self.platform_close();
    }
}

// ───────────────────────────────────────────────────────────────
// Factory
// ───────────────────────────────────────────────────────────────

/// [`ListenerFactory`] producing [`TlsListener`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsBinder;

impl ListenerFactory for TlsBinder {
    type Listener = TlsListener;

    fn bind(&mut self, port: u16, identity: &TlsIdentity) -> crate::error::Result<TlsListener> {
        Ok(TlsListener::bind(port, identity)?)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests (host path only; handshake tests live in tests/tls_integration.rs)
// ───────────────────────────────────────────────────────────────
