//! Write redirection
//!
//! The [`StreamRouter`] is the writer-facing entry point for an entity: it
//! resolves the active stream from the routing document (creating the
//! document on first use) and transparently follows stream closures to
//! their continuations, bounded by the configured hop limit. This is what
//! makes live migration invisible to application code: a writer that hits a
//! sealed stream re-reads the routing, hops, and reissues the same batch.

use crate::config::StreamConfig;
use crate::session::OpenConstraint;
use crate::stream::EventStream;
use lode_core::document::ObjectDocument;
use lode_core::error::{Error, Result};
use lode_core::event::Event;
use lode_core::traits::{DocumentStore, StorageBackend};
use lode_core::types::{ObjectIdentifier, StreamId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a redirected append finally landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Stream that accepted the batch
    pub stream_id: StreamId,
    /// Stream version after the commit
    pub version: u64,
}

/// Migration-transparent writer for one entity
#[derive(Clone)]
pub struct StreamRouter {
    backend: Arc<dyn StorageBackend>,
    documents: Arc<dyn DocumentStore>,
    object: ObjectIdentifier,
    config: StreamConfig,
}

impl StreamRouter {
    /// Bind a router to an entity
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        documents: Arc<dyn DocumentStore>,
        object: ObjectIdentifier,
        config: StreamConfig,
    ) -> Self {
        Self {
            backend,
            documents,
            object,
            config,
        }
    }

    /// The entity this router writes for
    pub fn object(&self) -> &ObjectIdentifier {
        &self.object
    }

    /// Load the entity's routing document, creating it (with a freshly
    /// generated stream) on first use.
    ///
    /// Losing the create race to another writer is fine: the winner's
    /// routing is adopted.
    ///
    /// # Errors
    ///
    /// Returns an error if the document store fails.
    pub fn resolve(&self) -> Result<ObjectDocument> {
        if let Some((doc, _)) = self.documents.get(&self.object)? {
            return Ok(doc);
        }
        let doc = ObjectDocument::new(self.object.clone(), StreamId::generate(&self.object));
        match self.documents.set(&doc, None) {
            Ok(_) => {
                info!(object = %self.object, stream = %doc.active_stream.stream_id, "routing document created");
                Ok(doc)
            }
            Err(Error::DocumentConflict { .. }) => self
                .documents
                .get(&self.object)?
                .map(|(doc, _)| doc)
                .ok_or_else(|| Error::storage("document vanished after create conflict")),
            Err(e) => Err(e),
        }
    }

    /// An [`EventStream`] over an arbitrary stream of this entity
    pub fn stream(&self, stream_id: StreamId) -> EventStream {
        EventStream::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.documents),
            self.object.clone(),
            stream_id,
            self.config.clone(),
        )
    }

    /// The entity's currently routed stream
    ///
    /// # Errors
    ///
    /// Returns an error if the document store fails.
    pub fn active_stream(&self) -> Result<EventStream> {
        Ok(self.stream(self.resolve()?.active_stream.stream_id))
    }

    /// Append a batch to the entity's active stream, hopping continuations
    /// as needed.
    ///
    /// On `StreamClosed` the continuation is taken from the closure event
    /// itself when available (authoritative in the window between close and
    /// routing cutover), falling back to the re-read routing document.
    /// Bounded by `hop_limit`; a genuine `ConcurrencyConflict` (no closure
    /// involved) is surfaced untouched for the caller's retry policy.
    ///
    /// # Errors
    ///
    /// `HopLimitExceeded` when the continuation chain outruns the bound;
    /// `ConcurrencyConflict` on a plain lost race.
    pub fn append(&self, events: Vec<Event>) -> Result<AppendOutcome> {
        let mut current = self.resolve()?.active_stream.stream_id;
        let mut hops = 0u32;
        loop {
            let stream = self.stream(current.clone());
            let attempt = stream
                .open_session(OpenConstraint::Loose)
                .and_then(|mut session| {
                    for event in events.iter().cloned() {
                        session.append(event)?;
                    }
                    session.commit()
                });
            match attempt {
                Ok(version) => {
                    return Ok(AppendOutcome {
                        stream_id: current,
                        version,
                    })
                }
                Err(Error::StreamClosed { continuation, .. }) => {
                    if hops >= self.config.hop_limit {
                        warn!(
                            object = %self.object,
                            hops,
                            "continuation hop limit exceeded"
                        );
                        return Err(Error::HopLimitExceeded { hops });
                    }
                    hops += 1;
                    current = self.next_hop(&current, continuation)?;
                    debug!(
                        object = %self.object,
                        hop = hops,
                        stream = %current,
                        "append redirected to continuation"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pick the stream to retry against after hitting a sealed one
    fn next_hop(&self, closed: &StreamId, continuation: Option<StreamId>) -> Result<StreamId> {
        if let Some(next) = continuation {
            return Ok(next);
        }
        // Closure payload was unreadable; the routing document is the
        // remaining source of truth
        let doc = self.resolve()?;
        if let Some(next) = doc.continuation_of(closed) {
            return Ok(next.clone());
        }
        if !doc.is_active(closed) {
            return Ok(doc.active_stream.stream_id.clone());
        }
        Err(Error::integrity(format!(
            "stream {closed} is sealed but no continuation is recorded"
        )))
    }
}

impl std::fmt::Debug for StreamRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRouter")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}
