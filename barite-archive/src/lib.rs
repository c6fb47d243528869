//! Portable group bundle format.
//!
//! A bundle is a zip container with exactly one manifest entry
//! (`plugin.dat`, the serialized group metadata and item records) and zero
//! or more blob entries named `{sha256-hex}{ext}`. Blob names are verified
//! against a freshly computed digest on read, so a tampered bundle is
//! rejected before anything touches the local store.
//!
//! This crate only defines the container; allocating IDs and persisting the
//! imported items is the registry's job.

mod bundle;
mod error;
mod manifest;

pub use bundle::{Bundle, BundleBlob};
pub use error::ArchiveError;
pub use manifest::{GroupManifest, ManifestItem};
