//! Persisted station credentials.
//!
//! One fixed-size record in the `"auth"` namespace:
//!
//! ```text
//!   0        256       512   514
//!   ├─ id ───┼─ pass ──┼─ ck ┤
//!   NUL-terminated     BE u16 wrapping sum of id + pass bytes
//! ```
//!
//! The record is written in a single storage call; a torn or foreign blob
//! fails the length or checksum test and reads back as "no credentials".

use log::{debug, info, warn};

use crate::app::ports::{CredentialPort, StoragePort};

use super::utils::checksum16;

pub const CREDENTIAL_NAMESPACE: &str = "auth";
pub const CREDENTIAL_KEY: &str = "wifi";

const FIELD_SIZE: usize = 256;
const MAX_FIELD: usize = FIELD_SIZE - 1;
const CHECKSUM_OFFSET: usize = 2 * FIELD_SIZE;
pub const RECORD_SIZE: usize = CHECKSUM_OFFSET + 2;

/// Build the on-flash record.  `None` if either field is too long.
pub fn encode_record(id: &str, pass: &str) -> Option<[u8; RECORD_SIZE]> {
    if id.len() > MAX_FIELD || pass.len() > MAX_FIELD {
        return None;
    }
    let mut rec = [0u8; RECORD_SIZE];
    rec[..id.len()].copy_from_slice(id.as_bytes());
    rec[FIELD_SIZE..FIELD_SIZE + pass.len()].copy_from_slice(pass.as_bytes());
    let ck = checksum16(&[id.as_bytes(), pass.as_bytes()]);
    rec[CHECKSUM_OFFSET..].copy_from_slice(&ck.to_be_bytes());
    Some(rec)
}

fn nul_field(slot: &[u8]) -> &[u8] {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    &slot[..end]
}

/// Parse a stored record.  `None` unless it is well formed with a
/// matching checksum and a non-empty id.
pub fn decode_record(rec: &[u8]) -> Option<(&str, &str)> {
    if rec.len() != RECORD_SIZE {
        return None;
    }
    let id = nul_field(&rec[..MAX_FIELD]);
    let pass = nul_field(&rec[FIELD_SIZE..FIELD_SIZE + MAX_FIELD]);
    let stored = u16::from_be_bytes([rec[CHECKSUM_OFFSET], rec[CHECKSUM_OFFSET + 1]]);
    if stored != checksum16(&[id, pass]) || id.is_empty() {
        return None;
    }
    let id = core::str::from_utf8(id).ok()?;
    let pass = core::str::from_utf8(pass).ok()?;
    Some((id, pass))
}

pub struct CredentialStore<S: StoragePort> {
    storage: S,
    id: heapless::String<MAX_FIELD>,
    pass: heapless::String<MAX_FIELD>,
    valid: bool,
}

impl<S: StoragePort> CredentialStore<S> {
    /// Wrap `storage` and load whatever record it holds.
    pub fn new(storage: S) -> Self {
        let mut store = Self {
            storage,
            id: heapless::String::new(),
            pass: heapless::String::new(),
            valid: false,
        };
        store.reload();
        store
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Remove the persisted record and forget the cached copy.
    pub fn clear(&mut self) -> bool {
        self.invalidate();
        self.storage
            .delete(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY)
            .is_ok()
    }

    fn invalidate(&mut self) {
        self.id.clear();
        self.pass.clear();
        self.valid = false;
    }

    fn cache(&mut self, id: &str, pass: &str) {
        self.invalidate();
        // Both fit: field length is checked against MAX_FIELD before caching.
        let _ = self.id.push_str(id);
        let _ = self.pass.push_str(pass);
        self.valid = !id.is_empty();
    }
}

impl<S: StoragePort> CredentialPort for CredentialStore<S> {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn id(&self) -> &str {
        if self.valid { &self.id } else { "" }
    }

    fn pass(&self) -> &str {
        if self.valid { &self.pass } else { "" }
    }

    fn update(&mut self, id: &str, pass: &str) -> bool {
        let Some(rec) = encode_record(id, pass) else {
            warn!("Credentials: field longer than {} bytes", MAX_FIELD);
            return false;
        };
        if let Err(e) = self.storage.write(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY, &rec) {
            warn!("Credentials: write failed: {}", e);
            return false;
        }
        self.cache(id, pass);
        info!("Credentials: stored network '{}'", id);
        true
    }

    fn reload(&mut self) {
        if !self.storage.exists(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY) {
            debug!("Credentials: no stored record");
            self.invalidate();
            return;
        }
        let mut rec = [0u8; RECORD_SIZE];
        let loaded = match self.storage.read(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY, &mut rec) {
            Ok(len) => decode_record(&rec[..len]),
            Err(_) => None,
        };
        match loaded {
            Some((id, pass)) => self.cache(id, pass),
            None => {
                warn!("Credentials: stored record is unreadable");
                self.invalidate();
            }
        }
    }
}
