//! Remote-control settings
//!
//! Immutable configuration for the access-point radio, both TLS servers and
//! the discovery beacon.  Loaded once at boot from a JSON document and
//! validated before anything is started.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rpc::codec::MAX_FIELD_LEN;

/// Certificate and private key presented by a TLS server (PEM text).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsIdentity {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

/// Fallback access point and the provisioning server that runs on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPointSettings {
    // --- Radio ---
    pub ssid: String,
    /// WPA2 passphrase; empty for an open network.
    pub password: String,
    pub hidden: bool,
    pub channel: u8,
    pub max_connections: u8,

    // --- Addressing ---
    pub ip_address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,

    // --- Provisioning server ---
    pub auth_username: String,
    pub auth_password: String,
    pub port: u16,
    /// Wait for each inbound frame (milliseconds).
    pub timeout_ms: u32,
    pub tls: TlsIdentity,
}

/// Operational command server and discovery beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandServerSettings {
    /// Station hostname announced to DHCP.
    pub hostname: String,
    pub port: u16,
    pub auth_username: String,
    pub auth_password: String,

    // --- Discovery ---
    pub udp_port: u16,
    pub udp_payload: Vec<u8>,
    pub udp_interval_ms: u32,

    // --- Timing ---
    /// Wait for each inbound frame (milliseconds).
    pub timeout_ms: u32,
    /// Station join budget, counted in whole seconds.
    pub join_timeout_secs: u16,

    pub tls: TlsIdentity,
}

/// Everything the stack needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteControlSettings {
    pub access_point: AccessPointSettings,
    pub command_server: CommandServerSettings,
}

impl Default for AccessPointSettings {
    fn default() -> Self {
        Self {
            ssid: "RemoteControl".into(),
            password: String::new(),
            hidden: false,
            channel: 11,
            max_connections: 1,

            ip_address: Ipv4Addr::new(192, 168, 4, 1),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
            subnet: Ipv4Addr::new(255, 255, 255, 0),

            auth_username: "admin".into(),
            auth_password: "password".into(),
            port: 4443,
            timeout_ms: 5000,
            tls: TlsIdentity::default(),
        }
    }
}

impl Default for CommandServerSettings {
    fn default() -> Self {
        Self {
            hostname: "remote-control".into(),
            port: 4443,
            auth_username: "admin".into(),
            auth_password: "password".into(),

            udp_port: 4444,
            udp_payload: b"remote-control".to_vec(),
            udp_interval_ms: 5000, // 1 beacon / 5 s

            timeout_ms: 5000,
            join_timeout_secs: 30,

            tls: TlsIdentity::default(),
        }
    }
}

impl RemoteControlSettings {
    /// Parse and validate a JSON settings document.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(text).map_err(|_| Error::Config("settings document is not valid JSON"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Range-check every field.  Rejects rather than clamps.
    pub fn validate(&self) -> Result<()> {
        self.access_point.validate()?;
        self.command_server.validate()
    }
}

fn check_credential(value: &str, what: &'static str) -> Result<()> {
    if value.len() > MAX_FIELD_LEN {
        return Err(Error::Config(what));
    }
    Ok(())
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    bits.leading_ones() + bits.trailing_zeros() == 32
}

impl AccessPointSettings {
    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(Error::Config("access_point.ssid must be 1-32 bytes"));
        }
        if !self.password.is_empty() && !(8..=63).contains(&self.password.len()) {
            return Err(Error::Config(
                "access_point.password must be empty or 8-63 bytes",
            ));
        }
        if !(1..=13).contains(&self.channel) {
            return Err(Error::Config("access_point.channel must be 1-13"));
        }
        if !(1..=4).contains(&self.max_connections) {
            return Err(Error::Config("access_point.max_connections must be 1-4"));
        }
        if !is_contiguous_mask(self.subnet) {
            return Err(Error::Config("access_point.subnet is not a contiguous mask"));
        }
        if self.port == 0 {
            return Err(Error::Config("access_point.port must be non-zero"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("access_point.timeout_ms must be non-zero"));
        }
        check_credential(&self.auth_username, "access_point.auth_username longer than 255 bytes")?;
        check_credential(&self.auth_password, "access_point.auth_password longer than 255 bytes")
    }

    /// Prefix length of `subnet` (e.g. 24 for 255.255.255.0).
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.subnet).leading_ones() as u8
    }
}

impl CommandServerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() || self.hostname.len() > 32 {
            return Err(Error::Config("command_server.hostname must be 1-32 bytes"));
        }
        if self.port == 0 || self.udp_port == 0 {
            return Err(Error::Config("command_server ports must be non-zero"));
        }
        if self.udp_payload.is_empty() {
            return Err(Error::Config("command_server.udp_payload must not be empty"));
        }
        if self.udp_interval_ms == 0 || self.timeout_ms == 0 {
            return Err(Error::Config("command_server intervals must be non-zero"));
        }
        if self.join_timeout_secs == 0 {
            return Err(Error::Config("command_server.join_timeout_secs must be non-zero"));
        }
        check_credential(&self.auth_username, "command_server.auth_username longer than 255 bytes")?;
        check_credential(&self.auth_password, "command_server.auth_password longer than 255 bytes")
    }
}
