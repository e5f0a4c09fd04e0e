//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] as namespaced blobs.  On the device each
//! call opens an `EspNvs` handle on the default partition; elsewhere a
//! `HashMap` keyed by `namespace::key` stands in.
//!
//! # Security
//!
//! - The credential record lives in the `"auth"` namespace.  With
//!   `CONFIG_NVS_ENCRYPTION` set the partition is AES-XTS encrypted and
//!   the calls below need no change.
//! - `EspNvs::set_raw` commits before returning, so a write is atomic.

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

/// NVS limits namespace and key names to 15 bytes.
const MAX_NAME_LEN: usize = 15;

fn check_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(StorageError::InvalidKey);
    }
    Ok(())
}

pub struct NvsAdapter {
    #[cfg(target_os = "espidf")]
    partition: EspDefaultNvsPartition,

    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
    /// Simulation: make every write fail with `IoError`.
    #[cfg(not(target_os = "espidf"))]
    fail_writes: bool,
}

impl NvsAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        info!("NVS: default partition attached");
        Self { partition }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        info!("NVS: simulation backend");
        Self {
            store: HashMap::new(),
            fail_writes: false,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    #[cfg(target_os = "espidf")]
    fn open(&self, namespace: &str, read_write: bool) -> Result<EspNvs<NvsDefault>, StorageError> {
        EspNvs::new(self.partition.clone(), namespace, read_write).map_err(|e| {
            warn!("NVS: open '{}' failed: {}", namespace, e);
            StorageError::IoError
        })
    }

    // ── Platform helpers ──────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let nvs = self.open(namespace, false)?;
        match nvs.blob_len(key) {
            Ok(Some(len)) if len > buf.len() => return Err(StorageError::Full),
            Ok(Some(_)) => {}
            Ok(None) => return Err(StorageError::NotFound),
            Err(_) => return Err(StorageError::IoError),
        }
        match nvs.get_raw(key, buf) {
            Ok(Some(data)) => Ok(data.len()),
            Ok(None) => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self
            .store
            .get(&Self::composite_key(namespace, key))
            .ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::Full);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    #[cfg(target_os = "espidf")]
    fn platform_write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.set_raw(key, data).map(|_| ()).map_err(|e| {
            warn!("NVS: write {}::{} failed: {}", namespace, key, e);
            StorageError::IoError
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            warn!("NVS(sim): write {}::{} rejected", namespace, key);
            return Err(StorageError::IoError);
        }
        self.store
            .insert(Self::composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.remove(key).map(|_| ()).map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&Self::composite_key(namespace, key));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_exists(&self, namespace: &str, key: &str) -> bool {
        self.open(namespace, false)
            .ok()
            .and_then(|nvs| nvs.contains(key).ok())
            .unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&Self::composite_key(namespace, key))
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        check_name(namespace)?;
        check_name(key)?;
        self.platform_read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_name(namespace)?;
        check_name(key)?;
        self.platform_write(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        check_name(namespace)?;
        check_name(key)?;
        self.platform_delete(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        check_name(namespace).is_ok() && check_name(key).is_ok() && self.platform_exists(namespace, key)
    }
}
