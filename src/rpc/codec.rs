//! Tagged key/value frame codec.
//!
//! Wire format (one entry per map pair, then a terminator):
//! ```text
//! ┌──────┬─────┬───────────┬──────┬─────┬─────────────┐
//! │ 0x10 │ len │ key bytes │ 0x11 │ len │ value bytes │ ... 0x00
//! └──────┴─────┴───────────┴──────┴─────┴─────────────┘
//!   KEY    u8    0..=255     VALUE   u8    0..=255      TERMINATOR
//! ```
//!
//! Decoding never fails.  The first structural violation (unexpected tag,
//! a length running past the end of the buffer, a field that is not
//! UTF-8) ends the scan and whatever entries were already accepted are
//! kept.  Garbage therefore degrades to a partial or empty map.
//!
//! Reading from a live connection goes through [`FrameScanner`], a
//! streaming state machine that asks for exactly the bytes the grammar
//! needs next, so a frame is never over-read and the drain stops as soon
//! as the frame is complete or broken.

use std::thread::sleep;
use std::time::{Duration, Instant};

use log::debug;

use crate::map::FixedMap;

use super::transport::{Transport, write_all};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const KEY_TAG: u8 = 0x10;
pub const VALUE_TAG: u8 = 0x11;
pub const TERMINATOR: u8 = 0x00;

/// Longest key or value the one-byte length prefix can describe.
pub const MAX_FIELD_LEN: usize = 255;

/// Upper bound on the bytes collected for one inbound frame.
pub const FRAME_BUFFER_SIZE: usize = 1024;

/// Entries an inbound request may carry.
pub const ACTION_CAPACITY: usize = 24;

/// Delay between polls while waiting for the first byte of a frame.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Delay between reads once a frame has started arriving.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Consecutive empty drain reads tolerated before the frame is cut off.
const MAX_IDLE_DRAINS: u32 = 25;

// ───────────────────────────────────────────────────────────────
// Types
// ───────────────────────────────────────────────────────────────

/// One key or value on the wire.
pub type Field = heapless::String<MAX_FIELD_LEN>;

/// Text map that can be carried by the frame codec.
pub type SerialMap<const N: usize> = FixedMap<Field, Field, N>;

/// Decoded request.
pub type ActionMap = SerialMap<ACTION_CAPACITY>;

/// Response frame (a single `"result"` entry).
pub type ResponseMap = SerialMap<1>;

/// Copy `s` into a [`Field`]; `None` if it exceeds [`MAX_FIELD_LEN`].
pub fn field(s: &str) -> Option<Field> {
    Field::try_from(s).ok()
}

fn field_from_wire(raw: &[u8]) -> Option<Field> {
    core::str::from_utf8(raw).ok().and_then(field)
}

impl<const N: usize> FixedMap<Field, Field, N> {
    /// Build a map from string pairs.  Pairs that do not fit (too long,
    /// or past capacity) are dropped.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.put_str(k, v);
        }
        map
    }

    /// `put` for borrowed strings.  `false` if either side is longer
    /// than a field or the map is full.
    pub fn put_str(&mut self, key: &str, value: &str) -> bool {
        match (field(key), field(value)) {
            (Some(k), Some(v)) => self.put(k, v),
            _ => false,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).map(Field::as_str)
    }

    // ── Decode ────────────────────────────────────────────────

    /// Parse a frame.  Stops silently at the first structural violation.
    pub fn decode(bytes: &[u8]) -> Self {
        let mut map = Self::new();
        let len = bytes.len();
        let mut cursor = 0;

        while cursor + 2 < len {
            if bytes[cursor] != KEY_TAG {
                break;
            }
            cursor += 1;
            let key_len = bytes[cursor] as usize;
            cursor += 1;
            // Key bytes, value tag and value length must all be present.
            if cursor + key_len + 2 > len {
                break;
            }
            let Some(key) = field_from_wire(&bytes[cursor..cursor + key_len]) else {
                break;
            };
            cursor += key_len;

            if bytes[cursor] != VALUE_TAG {
                break;
            }
            cursor += 1;
            let value_len = bytes[cursor] as usize;
            cursor += 1;
            if cursor + value_len > len {
                break;
            }
            let Some(value) = field_from_wire(&bytes[cursor..cursor + value_len]) else {
                break;
            };
            cursor += value_len;

            // Over capacity: dropped, keep scanning (later keys may update).
            map.put(key, value);
        }

        map
    }

    /// Receive one frame from `conn` and decode it.
    ///
    /// Waits up to `timeout` for the first byte; an idle peer yields an
    /// empty map.
    pub fn read_from<T: Transport + ?Sized>(conn: &mut T, timeout: Duration) -> Self {
        Self::decode(&read_frame(conn, timeout))
    }

    // ── Encode ────────────────────────────────────────────────

    /// Exact encoded size, terminator included.
    pub fn encoded_len(&self) -> usize {
        1 + self
            .iter()
            .map(|(k, v)| k.len() + v.len() + 4)
            .sum::<usize>()
    }

    /// Encode into `out`.  Returns the byte count, or `None` without
    /// touching `out` when it is too small.
    pub fn serialize(&self, out: &mut [u8]) -> Option<usize> {
        let total = self.encoded_len();
        if total > out.len() {
            return None;
        }

        let mut pos = 0;
        for (k, v) in self.iter() {
            for (tag, bytes) in [(KEY_TAG, k.as_bytes()), (VALUE_TAG, v.as_bytes())] {
                out[pos] = tag;
                out[pos + 1] = bytes.len() as u8;
                out[pos + 2..pos + 2 + bytes.len()].copy_from_slice(bytes);
                pos += 2 + bytes.len();
            }
        }
        out[pos] = TERMINATOR;
        Some(total)
    }

    /// Stream the encoded frame to `conn` and flush it.
    ///
    /// Best effort: a stalled peer may receive a truncated frame.  Returns
    /// the number of bytes written.
    pub fn write_to<T: Transport + ?Sized>(&self, conn: &mut T) -> Result<usize, T::Error> {
        let mut written = 0;
        for (k, v) in self.iter() {
            for (tag, bytes) in [(KEY_TAG, k.as_bytes()), (VALUE_TAG, v.as_bytes())] {
                written += write_all(conn, &[tag, bytes.len() as u8])?;
                written += write_all(conn, bytes)?;
            }
        }
        written += write_all(conn, &[TERMINATOR])?;
        conn.flush()?;
        Ok(written)
    }
}

// ───────────────────────────────────────────────────────────────
// Streaming frame scanner
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Tag,
    KeyLen,
    Key { remaining: usize },
    ValueTag,
    ValueLen,
    Value { remaining: usize },
    Complete,
    Malformed,
}

/// Tracks frame structure byte by byte without storing anything.
#[derive(Debug, Clone)]
pub struct FrameScanner {
    state: ScanState,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Tag,
        }
    }

    /// Bytes the grammar needs next (0 once finished).
    pub fn wanted(&self) -> usize {
        match self.state {
            ScanState::Tag | ScanState::KeyLen | ScanState::ValueTag | ScanState::ValueLen => 1,
            ScanState::Key { remaining } | ScanState::Value { remaining } => remaining,
            ScanState::Complete | ScanState::Malformed => 0,
        }
    }

    /// Terminator seen at an entry boundary.
    pub fn is_complete(&self) -> bool {
        self.state == ScanState::Complete
    }

    /// Complete or malformed: nothing more belongs to this frame.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ScanState::Complete | ScanState::Malformed)
    }

    /// Advance over `data`.  Returns how many bytes belong to the frame;
    /// anything past that is left for the caller.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        let mut used = 0;
        while used < data.len() {
            self.state = match self.state {
                ScanState::Tag => {
                    let tag = data[used];
                    used += 1;
                    match tag {
                        KEY_TAG => ScanState::KeyLen,
                        TERMINATOR => ScanState::Complete,
                        _ => ScanState::Malformed,
                    }
                }
                ScanState::KeyLen => {
                    let len = data[used] as usize;
                    used += 1;
                    if len == 0 {
                        ScanState::ValueTag
                    } else {
                        ScanState::Key { remaining: len }
                    }
                }
                ScanState::Key { remaining } => {
                    let take = remaining.min(data.len() - used);
                    used += take;
                    if take == remaining {
                        ScanState::ValueTag
                    } else {
                        ScanState::Key {
                            remaining: remaining - take,
                        }
                    }
                }
                ScanState::ValueTag => {
                    let tag = data[used];
                    used += 1;
                    if tag == VALUE_TAG {
                        ScanState::ValueLen
                    } else {
                        ScanState::Malformed
                    }
                }
                ScanState::ValueLen => {
                    let len = data[used] as usize;
                    used += 1;
                    if len == 0 {
                        ScanState::Tag
                    } else {
                        ScanState::Value { remaining: len }
                    }
                }
                ScanState::Value { remaining } => {
                    let take = remaining.min(data.len() - used);
                    used += take;
                    if take == remaining {
                        ScanState::Tag
                    } else {
                        ScanState::Value {
                            remaining: remaining - take,
                        }
                    }
                }
                ScanState::Complete | ScanState::Malformed => break,
            };
        }
        used
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect the raw bytes of one frame from `conn`.
///
/// 1. Poll every 20 ms until the first byte arrives or `timeout` expires.
/// 2. Drain, asking the scanner how many bytes to read next, until the
///    frame completes or breaks, the buffer fills, the peer goes quiet for
///    `MAX_IDLE_DRAINS` drain intervals, the connection fails, or
///    `timeout` has passed since the first byte.
pub fn read_frame<T: Transport + ?Sized>(
    conn: &mut T,
    timeout: Duration,
) -> heapless::Vec<u8, FRAME_BUFFER_SIZE> {
    let mut frame = heapless::Vec::new();
    let mut scanner = FrameScanner::new();
    let mut chunk = [0u8; 64];

    let arrival_deadline = Instant::now() + timeout;
    loop {
        match conn.read(&mut chunk[..1]) {
            Ok(0) => {}
            Ok(_) => {
                scanner.feed(&chunk[..1]);
                if frame.push(chunk[0]).is_err() {
                    return frame;
                }
                break;
            }
            Err(e) => {
                debug!("frame: read failed while waiting ({:?})", e);
                return frame;
            }
        }
        if Instant::now() >= arrival_deadline {
            debug!("frame: nothing received within {:?}", timeout);
            return frame;
        }
        sleep(POLL_INTERVAL);
    }

    let drain_deadline = Instant::now() + timeout;
    let mut idle = 0;
    while !scanner.is_finished() && !frame.is_full() {
        let want = scanner
            .wanted()
            .min(chunk.len())
            .min(frame.capacity() - frame.len());
        match conn.read(&mut chunk[..want]) {
            Ok(0) => {
                idle += 1;
                if idle >= MAX_IDLE_DRAINS || Instant::now() >= drain_deadline {
                    debug!("frame: peer stalled after {} bytes", frame.len());
                    break;
                }
                sleep(DRAIN_INTERVAL);
            }
            Ok(n) => {
                idle = 0;
                scanner.feed(&chunk[..n]);
                if frame.extend_from_slice(&chunk[..n]).is_err() {
                    break;
                }
                if Instant::now() >= drain_deadline {
                    debug!("frame: drain deadline reached after {} bytes", frame.len());
                    break;
                }
            }
            Err(e) => {
                debug!("frame: read failed mid-frame ({:?})", e);
                break;
            }
        }
    }

    frame
}
