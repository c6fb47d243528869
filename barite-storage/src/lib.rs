//! Embedded storage layer for barite.
//!
//! Provides the ordered-byte-key store, the persisted ID cursor, generic
//! per-kind entity CRUD, and the content-addressed blob area.
//!
//! # Architecture
//!
//! - One SQLite table models the whole keyspace; prefixes namespace kinds
//! - Entities are JSON blobs decoded with serde defaults for forward
//!   compatibility
//! - Blobs (resource bytes) live outside the database, named by digest

mod blobs;
mod cursor;
mod entity_store;
mod error;
mod kv;

pub use blobs::BlobStore;
pub use cursor::IdAllocator;
pub use entity_store::EntityStore;
pub use error::{StorageError, StorageResult};
pub use kv::{id_from_bytes, id_to_bytes, KeyValueStore};
