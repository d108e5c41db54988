//! External interface contracts
//!
//! This module defines the StorageBackend and DocumentStore traits that the
//! engine depends on. Concrete cloud clients live outside the core; the
//! in-memory reference implementations live in `lode-storage`.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync). Both traits are object safe so
//! backends can be swapped behind `Arc<dyn ...>` without breaking upper
//! layers.

use crate::document::{DocumentHash, ObjectDocument};
use crate::error::Result;
use crate::event::{Event, RecordedEvent};
use crate::types::{ContinuationToken, ObjectIdentifier, StreamId};

/// One bounded page of a ranged stream read
#[derive(Debug, Clone)]
pub struct ReadPage {
    /// Events in ascending version order
    pub events: Vec<RecordedEvent>,
    /// Version to resume from, `None` when the range is exhausted
    pub next: Option<u64>,
}

/// One bounded page of a document listing
#[derive(Debug, Clone)]
pub struct DiscoveryPage {
    /// Object identifiers in listing order
    pub objects: Vec<ObjectIdentifier>,
    /// Cursor for the next page, `None` when the listing is exhausted
    pub next: Option<ContinuationToken>,
}

/// Append-with-expected-version event storage.
///
/// Versions are zero-based and gapless within a stream; a stream's
/// *version* is its event count, equivalently the next version to be
/// assigned. An absent stream has version 0.
pub trait StorageBackend: Send + Sync {
    /// Atomically append a batch of events.
    ///
    /// The append succeeds only if the stream's current version equals
    /// `expected_version` (compare-and-swap; expected 0 creates the
    /// stream). The batch is all-or-nothing: partial writes are forbidden.
    /// Returns the new stream version.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` on an expected-version mismatch; `Storage` on
    /// backend faults.
    fn append(&self, stream: &StreamId, expected_version: u64, events: &[Event]) -> Result<u64>;

    /// Read at most `limit` events with versions in `from..to` (ascending).
    ///
    /// `to` of `None` means "to the current end of the stream". Bounded by
    /// design: callers page through history rather than materializing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. Reading an absent
    /// stream yields an empty page, not an error.
    fn read_range(
        &self,
        stream: &StreamId,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> Result<ReadPage>;

    /// Current stream version (event count; 0 for an absent stream)
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn stream_version(&self, stream: &StreamId) -> Result<u64>;

    /// True if the stream has at least one event
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn exists(&self, stream: &StreamId) -> Result<bool>;
}

/// Persisted [`ObjectDocument`] store with hash compare-and-swap writes and
/// an ordered, resumable listing primitive.
pub trait DocumentStore: Send + Sync {
    /// Load an entity's document and its current content hash
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, object: &ObjectIdentifier) -> Result<Option<(ObjectDocument, DocumentHash)>>;

    /// Write a document under compare-and-swap.
    ///
    /// `expected` of `None` is create-only (fails `DocumentConflict` if a
    /// document already exists); `Some(hash)` requires the stored document
    /// to still hash to that value. Returns the new content hash.
    ///
    /// # Errors
    ///
    /// `DocumentConflict` on a CAS miss; `Storage` on backend faults.
    fn set(&self, doc: &ObjectDocument, expected: Option<DocumentHash>) -> Result<DocumentHash>;

    /// List object identifiers for one object-type name, one page at a
    /// time.
    ///
    /// Ordering is stable across pages; `token` resumes where the previous
    /// page left off. Shared by migration tooling and projection-rebuild
    /// discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn list(
        &self,
        object_name: &str,
        token: Option<ContinuationToken>,
        page_size: usize,
    ) -> Result<DiscoveryPage>;
}
