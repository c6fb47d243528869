//! Content-addressed blob area for resource bytes.
//!
//! Blobs live as read-only files named `{sha256-hex}{ext}` in one flat
//! directory. Writing the same content twice is a no-op, which is what
//! makes resource upload deduplication cheap.

use crate::{StorageError, StorageResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Flat directory of content-addressed blobs.
#[derive(Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Opens the blob directory, creating it if needed.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        if dir.exists() {
            if !dir.is_dir() {
                return Err(StorageError::InvalidData(format!(
                    "blob path exists and is not a directory: {}",
                    dir.display()
                )));
            }
        } else {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Computes the hex digest of `bytes`.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Stores `bytes` under its own digest, returning the hex digest.
    /// Writing content that is already present leaves the existing file
    /// untouched.
    pub fn store(&self, bytes: &[u8], ext: &str) -> StorageResult<String> {
        let digest = Self::digest(bytes);
        let path = self.path_for(&digest, ext);
        if !path.exists() {
            fs::write(&path, bytes)?;
        }
        Ok(digest)
    }

    /// Writes pre-hashed bytes (bundle import path). The caller has already
    /// verified that `digest` matches the content.
    pub fn store_verified(&self, digest: &str, ext: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path_for(digest, ext);
        if !path.exists() {
            fs::write(&path, bytes)?;
        }
        Ok(())
    }

    /// Reads a blob back.
    pub fn read(&self, digest: &str, ext: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(digest, ext);
        fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("blob {digest}{ext}"))
            } else {
                err.into()
            }
        })
    }

    #[must_use]
    pub fn contains(&self, digest: &str, ext: &str) -> bool {
        self.path_for(digest, ext).exists()
    }

    /// Filesystem path of a blob, for serving file attachments.
    #[must_use]
    pub fn path_for(&self, digest: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{digest}{ext}"))
    }
}
