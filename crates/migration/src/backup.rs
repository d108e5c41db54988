//! Backup seam
//!
//! The saga can snapshot the source stream before touching anything. Only
//! the contract lives here; bulk backup/restore orchestration is built atop
//! core primitives elsewhere.

use lode_core::error::Result;
use lode_core::types::StreamId;

/// Reference to a completed backup, sufficient to restore it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle(String);

impl BackupHandle {
    /// Wrap a provider-specific backup reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The provider-specific reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delegated stream backup/restore
pub trait BackupProvider: Send + Sync {
    /// Snapshot a stream, returning a handle for later restore
    ///
    /// # Errors
    ///
    /// A backup failure aborts the migration unless configured otherwise.
    fn backup(&self, stream: &StreamId) -> Result<BackupHandle>;

    /// Restore a stream from a handle
    ///
    /// # Errors
    ///
    /// Returns an error if the restore fails; rollback then stays in
    /// `RollingBack` for operator attention.
    fn restore(&self, handle: &BackupHandle) -> Result<()>;
}
