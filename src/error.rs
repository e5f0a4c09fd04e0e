//! Unified error type for the remote-control stack.
//!
//! Steady-state request handling never returns these: malformed frames,
//! rejected credentials and unknown actions are answered on the wire and
//! logged.  `Error` covers the set-up paths (settings validation, binding
//! a listener, bringing up the radio, opening storage).  All variants are
//! `Copy` so they pass through the mode handlers without allocation.

use core::fmt;

use crate::adapters::tls_transport::TlsTransportError;
use crate::app::ports::{ConnectivityError, StorageError};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Station join or access-point start failed.
    Network(ConnectivityError),
    /// TLS listener could not be created.
    Tls(TlsTransportError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Settings are invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Tls(e) => write!(f, "tls: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Network(e)
    }
}

impl From<TlsTransportError> for Error {
    fn from(e: TlsTransportError) -> Self {
        Self::Tls(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
