//! EventStream: one entity+stream's append-only sequence
//!
//! The stream owns the commit path: expected-version compare-and-swap
//! appends, detection of sealed streams, and best-effort upkeep of the
//! entity's routing document. It holds only `Arc` references; clones are
//! cheap and all coordination is through the backend's CAS.

use crate::config::StreamConfig;
use crate::iter::EventIter;
use crate::session::{OpenConstraint, Session};
use lode_core::document::ObjectDocument;
use lode_core::error::{Error, Result};
use lode_core::event::Event;
use lode_core::traits::{DocumentStore, StorageBackend};
use lode_core::types::{ObjectIdentifier, StreamId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One entity+stream's event sequence.
///
/// Appends go through buffered [`Session`]s committed with optimistic
/// concurrency; reads are lazy and paginated. A stream sealed by a closure
/// event rejects every further append with `StreamClosed`.
#[derive(Clone)]
pub struct EventStream {
    backend: Arc<dyn StorageBackend>,
    documents: Arc<dyn DocumentStore>,
    object: ObjectIdentifier,
    stream_id: StreamId,
    config: StreamConfig,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("object", &self.object)
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Bind a stream to its backend, document store and configuration
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        documents: Arc<dyn DocumentStore>,
        object: ObjectIdentifier,
        stream_id: StreamId,
        config: StreamConfig,
    ) -> Self {
        Self {
            backend,
            documents,
            object,
            stream_id,
            config,
        }
    }

    /// The stream's identifier
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The entity owning this stream
    pub fn object(&self) -> &ObjectIdentifier {
        &self.object
    }

    /// Current stream version (event count, including any closure event)
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn version(&self) -> Result<u64> {
        self.backend.stream_version(&self.stream_id)
    }

    /// True if the stream has at least one event
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn exists(&self) -> Result<bool> {
        self.backend.exists(&self.stream_id)
    }

    /// Open an append session, checking the constraint and refusing sealed
    /// streams.
    ///
    /// The session captures the stream version observed here as its commit
    /// expectation.
    ///
    /// # Errors
    ///
    /// `StreamAlreadyExists` / `StreamNotFound` per the constraint;
    /// `StreamClosed` if the stream's tail is a closure event.
    pub fn open_session(&self, constraint: OpenConstraint) -> Result<Session> {
        let version = self.version()?;
        match constraint {
            OpenConstraint::New if version > 0 => {
                return Err(Error::StreamAlreadyExists {
                    stream: self.stream_id.clone(),
                })
            }
            OpenConstraint::Existing if version == 0 => {
                return Err(Error::StreamNotFound {
                    stream: self.stream_id.clone(),
                })
            }
            _ => {}
        }
        if let Some((_, continuation)) = self.sealed_tail()? {
            return Err(Error::StreamClosed {
                stream: self.stream_id.clone(),
                continuation,
            });
        }
        Ok(Session::new(self.clone(), version))
    }

    /// Lazily iterate events with versions in `from..to` (ascending).
    ///
    /// `to` of `None` reads to the end of the stream. Events are fetched
    /// `read_page_size` at a time; unbounded history is never materialized.
    pub fn read(&self, from: u64, to: Option<u64>) -> EventIter {
        EventIter::new(
            Arc::clone(&self.backend),
            self.stream_id.clone(),
            from,
            to,
            self.config.read_page_size,
        )
    }

    /// Seal the stream with the reserved closure event.
    ///
    /// Written through the same compare-and-swap path as business appends:
    /// the close succeeds only if the stream version still equals
    /// `expected_version`, which is what makes migration cutover atomic. A
    /// stream already sealed reports `StreamClosed` rather than a conflict,
    /// so a resumed migration can tell the two apart.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` if events arrived past `expected_version`;
    /// `StreamClosed` if a closure event already landed.
    pub fn append_closure(&self, expected_version: u64, continuation: &StreamId) -> Result<u64> {
        let closure = Event::closure(continuation)?;
        match self.backend.append(&self.stream_id, expected_version, &[closure]) {
            Ok(version) => {
                info!(
                    stream = %self.stream_id,
                    continuation = %continuation,
                    sealed_version = version,
                    "stream sealed"
                );
                Ok(version)
            }
            Err(conflict @ Error::ConcurrencyConflict { .. }) => {
                Err(self.conflict_or_closed(conflict))
            }
            Err(e) => Err(e),
        }
    }

    /// Commit a buffered batch under an expected version.
    ///
    /// On success, refreshes the routing document's last-known version
    /// (best effort). On a conflict, probes the tail: a closure event that
    /// landed in the meantime upgrades the conflict to `StreamClosed`.
    pub(crate) fn commit_batch(&self, expected: u64, events: &[Event]) -> Result<u64> {
        if events.is_empty() {
            return Ok(expected);
        }
        match self.backend.append(&self.stream_id, expected, events) {
            Ok(new_version) => {
                debug!(
                    stream = %self.stream_id,
                    events = events.len(),
                    version = new_version,
                    "commit applied"
                );
                self.refresh_document(new_version);
                Ok(new_version)
            }
            Err(conflict @ Error::ConcurrencyConflict { .. }) => {
                Err(self.conflict_or_closed(conflict))
            }
            Err(e) => Err(e),
        }
    }

    /// Tail probe: `(version, continuation)` of the closure event if the
    /// stream is sealed, `None` while it remains writable.
    ///
    /// Migration re-entry leans on this: the seal on the source stream is
    /// authoritative over any persisted saga state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn sealed_tail(&self) -> Result<Option<(u64, Option<StreamId>)>> {
        let version = self.version()?;
        if version == 0 {
            return Ok(None);
        }
        let page = self
            .backend
            .read_range(&self.stream_id, version - 1, Some(version), 1)?;
        Ok(page.events.last().and_then(|recorded| {
            recorded
                .event
                .is_closure()
                .then(|| (recorded.version, recorded.event.continuation()))
        }))
    }

    /// Upgrade a conflict to `StreamClosed` when the stream was sealed
    /// under the writer. Tail-probe failures fall back to the original
    /// conflict, which is still actionable.
    fn conflict_or_closed(&self, conflict: Error) -> Error {
        match self.sealed_tail() {
            Ok(Some((_, continuation))) => Error::StreamClosed {
                stream: self.stream_id.clone(),
                continuation,
            },
            _ => conflict,
        }
    }

    /// Best-effort routing-document upkeep after a successful commit.
    ///
    /// Creates the document on the entity's first append; bumps the
    /// last-known version while this stream is the active one. Writes from
    /// a non-active stream (the migration copier filling a target) leave
    /// the document alone. The commit itself is already durable, so
    /// exhausting the CAS retries only costs a stale hint.
    fn refresh_document(&self, new_version: u64) {
        for _ in 0..=self.config.document_update_retries {
            let outcome = (|| -> Result<()> {
                match self.documents.get(&self.object)? {
                    None => {
                        let mut doc =
                            ObjectDocument::new(self.object.clone(), self.stream_id.clone());
                        doc.last_known_version = new_version;
                        self.documents.set(&doc, None)?;
                    }
                    Some((mut doc, hash)) => {
                        if !doc.is_active(&self.stream_id)
                            || doc.last_known_version >= new_version
                        {
                            return Ok(());
                        }
                        doc.last_known_version = new_version;
                        self.documents.set(&doc, Some(hash))?;
                    }
                }
                Ok(())
            })();
            match outcome {
                Ok(()) => return,
                Err(Error::DocumentConflict { .. }) => continue,
                Err(e) => {
                    warn!(object = %self.object, error = %e, "routing document refresh failed");
                    return;
                }
            }
        }
        warn!(
            object = %self.object,
            "routing document refresh exhausted CAS retries"
        );
    }
}
