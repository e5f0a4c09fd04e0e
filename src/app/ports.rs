//! Port traits: the hexagonal boundary between the mode logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RemoteControl (mode machine + servers)
//! ```
//!
//! Radio, persistent storage, TLS listeners and the broadcast socket are
//! all reached through these traits.  [`RemoteControl`](super::service::RemoteControl)
//! takes them as generics, so the whole stack runs against mocks on the
//! host.
//!
//! ## Security notes
//!
//! - **StoragePort** writes MUST be atomic per call; the credential record
//!   is written in one call so a torn write can only fail its checksum.
//! - **ListenerFactory** never falls back to plaintext.

use core::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::config::{AccessPointSettings, TlsIdentity};
use crate::rpc::transport::Listener;

// ───────────────────────────────────────────────────────────────
// Connectivity port (radio)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// SSID empty, longer than 32 bytes, or not printable ASCII.
    InvalidSsid,
    /// Passphrase not empty and not 8–64 bytes.
    InvalidPassword,
    /// Station did not associate within the join timeout.
    JoinTimeout,
    /// The manual override was asserted while joining.
    JoinAborted,
    /// Driver refused the station configuration.
    ConnectionFailed,
    /// Driver refused the access-point configuration.
    AccessPointFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::JoinTimeout => write!(f, "station join timed out"),
            Self::JoinAborted => write!(f, "station join aborted by override"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AccessPointFailed => write!(f, "access point start failed"),
        }
    }
}

/// Station / access-point control of the radio.
pub trait ConnectivityPort {
    /// Configure station mode and start associating.  Returns once the
    /// attempt is under way; poll [`is_connected`](Self::is_connected).
    fn begin_station(
        &mut self,
        hostname: &str,
        ssid: &str,
        password: &str,
    ) -> Result<(), ConnectivityError>;

    /// Associated and holding an address.
    fn is_connected(&self) -> bool;

    fn disconnect(&mut self);

    /// Switch the radio to access-point mode with the given settings.
    fn start_access_point(&mut self, settings: &AccessPointSettings)
    -> Result<(), ConnectivityError>;

    /// Current IPv4 address of the active interface.
    fn local_ip(&self) -> Option<Ipv4Addr>;
}

// ───────────────────────────────────────────────────────────────
// Credential port (persisted station credentials)
// ───────────────────────────────────────────────────────────────

/// Stored network credentials with an integrity check.
pub trait CredentialPort {
    /// Checksum matched and an id is present.
    fn is_valid(&self) -> bool;

    /// Network id, or `""` when invalid.
    fn id(&self) -> &str;

    /// Passphrase, or `""` when invalid.
    fn pass(&self) -> &str;

    /// Persist new credentials.  `false` if they could not be written.
    fn update(&mut self, id: &str, pass: &str) -> bool;

    /// Re-read the persisted record.
    fn reload(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent namespaced blob storage.
///
/// # Security
///
/// - Implementations SHOULD keep the `"auth"` namespace on an encrypted
///   partition.
/// - Write operations MUST be atomic, with no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Namespace or key name rejected by the backend.
    InvalidKey,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidKey => write!(f, "invalid namespace or key"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Listener factory (TLS server sockets)
// ───────────────────────────────────────────────────────────────

/// Creates the TLS listener each server runs on.
pub trait ListenerFactory {
    type Listener: Listener;

    /// Bind `0.0.0.0:port` with the given certificate and key.
    fn bind(&mut self, port: u16, identity: &TlsIdentity) -> crate::error::Result<Self::Listener>;
}

// ───────────────────────────────────────────────────────────────
// Broadcaster (discovery datagrams)
// ───────────────────────────────────────────────────────────────

/// Sends one UDP datagram to a broadcast address.
pub trait Broadcaster {
    /// Returns `false` if the datagram could not be sent.
    fn broadcast(&mut self, target: SocketAddrV4, payload: &[u8]) -> bool;
}
