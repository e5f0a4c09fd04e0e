//! UDP discovery broadcaster.
//!
//! One unbound-port socket with `SO_BROADCAST`, opened lazily on the first
//! datagram and kept for the life of the adapter.  Both lwIP (through
//! ESP-IDF's std support) and host sockets go through `std::net`.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use log::{debug, warn};

use crate::app::ports::Broadcaster;

#[derive(Default)]
pub struct UdpBroadcaster {
    socket: Option<UdpSocket>,
    sent: u32,
}

impl UdpBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Datagrams handed to the stack so far.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    fn socket(&mut self) -> Option<&UdpSocket> {
        if self.socket.is_none() {
            let opened = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
                .and_then(|sock| sock.set_broadcast(true).map(|()| sock));
            match opened {
                Ok(sock) => self.socket = Some(sock),
                Err(e) => {
                    warn!("Discovery: could not open broadcast socket: {}", e);
                    return None;
                }
            }
        }
        self.socket.as_ref()
    }
}

impl Broadcaster for UdpBroadcaster {
    fn broadcast(&mut self, target: SocketAddrV4, payload: &[u8]) -> bool {
        let Some(sock) = self.socket() else {
            return false;
        };
        match sock.send_to(payload, target) {
            Ok(_) => {
                self.sent = self.sent.wrapping_add(1);
                debug!("Discovery: {} bytes to {}", payload.len(), target);
                true
            }
            Err(e) => {
                warn!("Discovery: send to {} failed: {}", target, e);
                self.socket = None;
                false
            }
        }
    }
}
