//! Process-wide monotonic ID allocation.
//!
//! The allocator's high-water mark (the "cursor") is persisted before an ID
//! is handed out, so a crash between allocation and first use can only leave
//! a gap, never cause reuse.

use crate::kv::{id_from_bytes, id_to_bytes, KeyValueStore};
use crate::StorageResult;
use std::sync::Mutex;

const CURSOR_KEY: &[u8] = b"meta-cursor";

/// Issues monotonically increasing 64-bit IDs, persisted across restarts.
pub struct IdAllocator {
    kv: KeyValueStore,
    cursor: Mutex<u64>,
}

impl IdAllocator {
    /// Loads the persisted cursor, starting from 0 on a fresh store.
    pub fn open(kv: KeyValueStore) -> StorageResult<Self> {
        let cursor = match kv.get(CURSOR_KEY)? {
            Some(bytes) => id_from_bytes(&bytes)?,
            None => 0,
        };
        Ok(Self {
            kv,
            cursor: Mutex::new(cursor),
        })
    }

    /// Allocates the next ID. The increment and the durable write happen in
    /// one critical section; if the write fails the in-memory counter rolls
    /// back and the error is returned, so no two calls ever observe the same
    /// persisted cursor value as their result.
    pub fn next(&self) -> StorageResult<u64> {
        let mut cursor = self.cursor.lock().unwrap();
        let candidate = *cursor + 1;
        self.kv.put(CURSOR_KEY, &id_to_bytes(candidate))?;
        *cursor = candidate;
        Ok(candidate)
    }

    /// The highest ID allocated so far.
    #[must_use]
    pub fn high_water_mark(&self) -> u64 {
        *self.cursor.lock().unwrap()
    }
}
