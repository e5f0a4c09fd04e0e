//! Transport abstraction: a byte-oriented connection plus the listener
//! that produces connections.
//!
//! Concrete implementations:
//! - TLS over lwIP sockets with mbedTLS (ESP-IDF)
//! - TLS over `std::net` with rustls (host simulation)
//! - in-memory scripted connections (tests)
//!
//! The codec, authentication gate and both servers are generic over
//! these traits, so none of them knows which TLS stack is underneath.

use std::net::SocketAddr;

/// Byte-oriented connection to a single peer.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes accepted; 0 means "try again".
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Whether the connection is still open.
    fn available(&self) -> bool;

    /// Remote address, if the transport knows it.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Close the connection.  Further reads and writes fail.
    fn close(&mut self);
}

/// Source of connections for a server loop.
pub trait Listener {
    type Connection: Transport;

    /// Poll for a new connection (non-blocking).
    ///
    /// Returns `None` when nobody is waiting or the handshake failed.
    fn accept(&mut self) -> Option<Self::Connection>;

    /// `false` once the listening socket has failed and will never accept
    /// again.  Server loops return to their caller when this happens.
    fn is_open(&self) -> bool {
        true
    }
}

/// Write all of `data`, retrying short writes.
///
/// Gives up after `WRITE_MAX_STALLS` consecutive zero-length writes and
/// returns the number of bytes that did go out.
pub fn write_all<T: Transport + ?Sized>(conn: &mut T, data: &[u8]) -> Result<usize, T::Error> {
    const WRITE_MAX_STALLS: u32 = 100;

    let mut written = 0;
    let mut stalls = 0;
    while written < data.len() {
        match conn.write(&data[written..])? {
            0 => {
                stalls += 1;
                if stalls >= WRITE_MAX_STALLS {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            n => {
                written += n;
                stalls = 0;
            }
        }
    }
    Ok(written)
}

// ───────────────────────────────────────────────────────────────
// In-memory connection (tests)
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::{SocketAddr, Transport};
    use std::collections::VecDeque;

    /// Loopback connection with a pre-loaded inbound byte queue.
    pub struct MemoryTransport {
        pub inbound: VecDeque<u8>,
        pub outbound: Vec<u8>,
        pub closed: bool,
        /// Maximum bytes returned per read, to exercise partial reads.
        pub chunk: usize,
    }

    impl MemoryTransport {
        pub fn new(inbound: &[u8]) -> Self {
            Self {
                inbound: inbound.iter().copied().collect(),
                outbound: Vec::new(),
                closed: false,
                chunk: usize::MAX,
            }
        }
    }

    impl Transport for MemoryTransport {
        type Error = ();

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
            if self.closed {
                return Err(());
            }
            let n = buf.len().min(self.inbound.len()).min(self.chunk);
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
            if self.closed {
                return Err(());
            }
            self.outbound.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn available(&self) -> bool {
            !self.closed
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            Some(SocketAddr::from(([192, 168, 4, 2], 50_000)))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }
}
