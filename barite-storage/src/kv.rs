//! Ordered-byte-key embedded store.
//!
//! A single SQLite table `kv(key BLOB PRIMARY KEY, value BLOB)` provides
//! atomic single-key put/get/delete and ordered prefix-range scans. There
//! are no cross-key transactions; callers that perform multi-step updates
//! must treat a mid-sequence failure as "possibly partially applied" (every
//! step is an idempotent overwrite, so retrying is safe).

use crate::{StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Handle to the embedded store. Cheap to clone; all clones share one
/// serialized connection.
#[derive(Clone)]
pub struct KeyValueStore {
    conn: Arc<Mutex<Connection>>,
}

impl KeyValueStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_conn(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_conn(Connection::open_in_memory()?)
    }

    fn with_conn(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   BLOB PRIMARY KEY,
                value BLOB NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Writes a value, overwriting any previous value under the key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Reads a value, or `None` if the key is absent.
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Deletes a key. Deleting an absent key is not an error.
    pub fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Returns all `(key, value)` pairs whose key starts with `prefix`,
    /// in ascending byte order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        match prefix_upper_bound(prefix) {
            Some(upper) => {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![prefix, upper], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                // Prefix is all 0xff (or empty): scan to the end of the keyspace.
                let mut stmt =
                    conn.prepare("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                let rows = stmt.query_map(params![prefix], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }
}

/// Smallest byte string greater than every key with the given prefix,
/// or `None` if no such bound exists.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < 0xff {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Encodes an item ID as the 8 little-endian bytes appended to key prefixes.
#[must_use]
pub fn id_to_bytes(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

/// Decodes an item ID from a key suffix.
pub fn id_from_bytes(bytes: &[u8]) -> StorageResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::InvalidData(format!("bad id length: {}", bytes.len())))?;
    Ok(u64::from_le_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let kv = KeyValueStore::open_in_memory().unwrap();
        kv.put(b"a", b"1").unwrap();
        assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
        kv.put(b"a", b"2").unwrap();
        assert_eq!(kv.get(b"a").unwrap(), Some(b"2".to_vec()));
        kv.delete(b"a").unwrap();
        assert_eq!(kv.get(b"a").unwrap(), None);
        // deleting again is fine
        kv.delete(b"a").unwrap();
    }

    #[test]
    fn scan_is_prefix_scoped_and_ordered() {
        let kv = KeyValueStore::open_in_memory().unwrap();
        kv.put(b"rules-\x02", b"b").unwrap();
        kv.put(b"rules-\x01", b"a").unwrap();
        kv.put(b"rulet-\x01", b"other").unwrap();
        kv.put(b"groups-\x01", b"g").unwrap();

        let rows = kv.scan_prefix(b"rules-").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"rules-\x01".to_vec());
        assert_eq!(rows[1].0, b"rules-\x02".to_vec());
    }

    #[test]
    fn scan_handles_0xff_prefix() {
        let kv = KeyValueStore::open_in_memory().unwrap();
        kv.put(&[0xff, 0x01], b"x").unwrap();
        kv.put(&[0xfe], b"y").unwrap();
        let rows = kv.scan_prefix(&[0xff]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, b"x".to_vec());
    }

    #[test]
    fn id_bytes_round_trip() {
        for id in [0u64, 1, 0x1234_5678_9abc_def0, u64::MAX] {
            assert_eq!(id_from_bytes(&id_to_bytes(id)).unwrap(), id);
        }
        assert!(id_from_bytes(b"short").is_err());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        {
            let kv = KeyValueStore::open(&path).unwrap();
            kv.put(b"k", b"v").unwrap();
        }
        let kv = KeyValueStore::open(&path).unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
