//! Error types for the registry.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry's CRUD and lifecycle operations.
///
/// Validation errors are raised before any mutation. Storage errors during
/// a multi-step operation surface immediately without rollback; every step
/// is an idempotent overwrite, so callers may retry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Unknown ID or parent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation refused outright (e.g. deleting the root group).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The operation is structurally valid but not supported (e.g. nesting
    /// groups beyond depth 1).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Bad regex, cron expression, template, or pattern count.
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] barite_storage::StorageError),

    /// Registry/store drift, e.g. an active entity without a live handle.
    /// Proceeding would risk duplicate live matchers, so the operation is
    /// aborted.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A collaborator port rejected a registration or send.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Template rendering failed or exceeded its budget.
    #[error("render error: {0}")]
    Render(String),

    /// Bundle container failure.
    #[error(transparent)]
    Archive(#[from] barite_archive::ArchiveError),
}
