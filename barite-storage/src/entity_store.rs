//! Generic per-kind entity CRUD over the key-value store.
//!
//! Records are JSON blobs under `{prefix}{id-le-bytes}`. Decoding fills
//! absent fields from their serde defaults, which is how older records
//! survive additive schema changes without a version field.

use crate::kv::{id_from_bytes, id_to_bytes, KeyValueStore};
use crate::StorageResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::error;

/// CRUD over one entity kind, keyed by `{prefix}{id}`.
#[derive(Clone)]
pub struct EntityStore<T> {
    kv: KeyValueStore,
    prefix: &'static [u8],
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityStore<T>
where
    T: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(kv: KeyValueStore, prefix: &'static [u8]) -> Self {
        Self {
            kv,
            prefix,
            _marker: PhantomData,
        }
    }

    fn key(&self, id: u64) -> Vec<u8> {
        let mut key = self.prefix.to_vec();
        key.extend_from_slice(&id_to_bytes(id));
        key
    }

    /// Reads one record; `None` when the ID is absent.
    pub fn get(&self, id: u64) -> StorageResult<Option<T>> {
        match self.kv.get(&self.key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes one record, overwriting unconditionally.
    pub fn put(&self, id: u64, entity: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec(entity)?;
        self.kv.put(&self.key(id), &bytes)
    }

    /// Deletes one record.
    pub fn delete(&self, id: u64) -> StorageResult<()> {
        self.kv.delete(&self.key(id))
    }

    /// Range-scans every record of this kind. A record that fails to decode
    /// is logged and skipped so one corrupt entry cannot take down the rest.
    pub fn load_all(&self) -> StorageResult<HashMap<u64, T>> {
        let mut out = HashMap::new();
        for (key, value) in self.kv.scan_prefix(self.prefix)? {
            let id = match id_from_bytes(&key[self.prefix.len()..]) {
                Ok(id) => id,
                Err(err) => {
                    error!(?key, %err, "skipping record with malformed key");
                    continue;
                }
            };
            match serde_json::from_slice(&value) {
                Ok(entity) => {
                    out.insert(id, entity);
                }
                Err(err) => {
                    error!(id, %err, "skipping undecodable record");
                }
            }
        }
        Ok(out)
    }
}
