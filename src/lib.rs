//! Remote-control firmware library.
//!
//! Secure remote command execution for a Wi-Fi microcontroller: a TLS
//! command server with a tagged key/value wire format, a mode machine
//! that joins the configured network or falls back to a provisioning
//! access point, and the adapters that bind those to ESP-IDF.
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! inside each module; the host build runs the same logic in simulation.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod map;
pub mod rpc;

pub use app::service::RemoteControl;
pub use error::{Error, Result};
pub use fsm::OperatingMode;
