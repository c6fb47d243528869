//! Bundle packing, unpacking, and blob-name verification.

use std::io::{Cursor, Read, Write};

use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::{ArchiveError, GroupManifest};

const MANIFEST_ENTRY: &str = "plugin.dat";

/// A content-addressed blob carried alongside the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleBlob {
    /// 64-char lowercase hex digest.
    pub digest: String,
    /// Extension including the leading dot, or empty.
    pub ext: String,
    pub data: Vec<u8>,
}

impl BundleBlob {
    fn entry_name(&self) -> String {
        format!("{}{}", self.digest, self.ext)
    }
}

/// A parsed bundle: one manifest plus verified blobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub manifest: GroupManifest,
    pub blobs: Vec<BundleBlob>,
}

impl Bundle {
    /// Serializes the bundle into zip container bytes.
    pub fn write(&self) -> Result<Vec<u8>, ArchiveError> {
        let buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(buf);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(MANIFEST_ENTRY, options)?;
        zip.write_all(&serde_json::to_vec(&self.manifest)?)?;

        for blob in &self.blobs {
            zip.start_file(blob.entry_name(), options)?;
            zip.write_all(&blob.data)?;
        }

        let finished = zip.finish()?;
        Ok(finished.into_inner())
    }

    /// Parses container bytes. Fails on a missing manifest and on any blob
    /// entry whose name does not carry the digest of its own bytes; entries
    /// that are neither the manifest nor digest-named are ignored.
    pub fn read(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut manifest = None;
        let mut blobs = Vec::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;

            if name == MANIFEST_ENTRY {
                manifest = Some(serde_json::from_slice::<GroupManifest>(&data)?);
                continue;
            }
            if let Some((digest, ext)) = split_blob_name(&name) {
                let computed = hex::encode(Sha256::digest(&data));
                if !digest.eq_ignore_ascii_case(&computed) {
                    return Err(ArchiveError::HashMismatch(name));
                }
                blobs.push(BundleBlob {
                    digest: computed,
                    ext,
                    data,
                });
            }
        }

        let manifest = manifest.ok_or(ArchiveError::MissingManifest(MANIFEST_ENTRY))?;
        Ok(Self { manifest, blobs })
    }
}

/// Splits `{64-hex}{ext}` entry names; anything else is not a blob.
fn split_blob_name(name: &str) -> Option<(String, String)> {
    if name.len() < 64 {
        return None;
    }
    let (digest, ext) = name.split_at(64);
    if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some((digest.to_string(), ext.to_string()))
}
