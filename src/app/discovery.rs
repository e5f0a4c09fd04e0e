//! Discovery beacon.
//!
//! While the command server runs, a fixed payload is broadcast to the
//! local /24 so clients can find the device without knowing its address:
//!
//! ```text
//! local 192.168.1.37  ──▶  UDP 192.168.1.255:<udp_port>  every udp_interval_ms
//! ```
//!
//! The first tick after [`DiscoveryBeacon::start`] always sends.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::CommandServerSettings;

use super::ports::Broadcaster;

pub struct DiscoveryBeacon {
    port: u16,
    payload: Vec<u8>,
    interval: Duration,
    target: Option<SocketAddrV4>,
    last_sent: Option<Instant>,
}

/// `a.b.c.255` for a local address `a.b.c.d`.
pub fn broadcast_address(local: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = local.octets();
    Ipv4Addr::new(a, b, c, 255)
}

impl DiscoveryBeacon {
    pub fn new(settings: &CommandServerSettings) -> Self {
        Self {
            port: settings.udp_port,
            payload: settings.udp_payload.clone(),
            interval: Duration::from_millis(u64::from(settings.udp_interval_ms)),
            target: None,
            last_sent: None,
        }
    }

    /// Aim at the broadcast address of `local_ip` and arm the first send.
    /// Without an address the beacon stays silent.
    pub fn start(&mut self, local_ip: Option<Ipv4Addr>) {
        self.target = local_ip.map(|ip| SocketAddrV4::new(broadcast_address(ip), self.port));
        self.last_sent = None;
        if self.target.is_none() {
            warn!("Discovery: no local address, beacon disabled");
        }
    }

    pub fn target(&self) -> Option<SocketAddrV4> {
        self.target
    }

    /// Send if the interval has elapsed.  Returns `true` when a datagram
    /// went out.
    pub fn tick<B: Broadcaster + ?Sized>(&mut self, now: Instant, out: &mut B) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let due = match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if !due {
            return false;
        }
        // A failed send still restarts the interval so a dead socket is not
        // hammered every loop pass.
        self.last_sent = Some(now);
        if out.broadcast(target, &self.payload) {
            debug!("Discovery: beacon sent to {target}");
            true
        } else {
            warn!("Discovery: broadcast to {target} failed");
            false
        }
    }
}
