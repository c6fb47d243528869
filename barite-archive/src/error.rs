use thiserror::Error;

/// Errors reading or writing a bundle.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Structural failure: the container has no manifest entry.
    #[error("bundle has no manifest entry ({0})")]
    MissingManifest(&'static str),

    /// A blob entry's name does not match the digest of its bytes.
    #[error("blob entry {0} does not match its content digest")]
    HashMismatch(String),
}
