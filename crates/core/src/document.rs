//! Routing documents
//!
//! The [`ObjectDocument`] is the persisted entity -> active-stream mapping
//! plus the terminated-stream history that accumulates across migrations.
//! Documents are mutated through compare-and-swap on a content hash
//! ([`DocumentHash`]), mirroring the expected-version discipline used for
//! stream appends.

use crate::error::Result;
use crate::types::{ObjectIdentifier, StreamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Pointer to an entity's currently writable stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// The active stream
    pub stream_id: StreamId,
    /// Backend-specific locator (partition, table, bucket), if any
    pub backend_ref: Option<String>,
    /// References to snapshots taken of this stream
    pub snapshot_refs: Vec<String>,
}

impl StreamInfo {
    /// Stream info with no backend ref and no snapshots
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            backend_ref: None,
            snapshot_refs: Vec::new(),
        }
    }
}

/// Record of a stream sealed by a migration, pointing at its continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedStream {
    /// The sealed stream
    pub stream_id: StreamId,
    /// Stream version at which the closure event landed
    pub termination_version: u64,
    /// Successor stream carrying the entity's sequence forward
    pub continuation: StreamId,
    /// When the stream was sealed
    pub terminated_at: DateTime<Utc>,
}

/// Persisted entity routing state: active stream plus terminated-stream
/// history.
///
/// Created on first append (or lazily on read), updated on every successful
/// commit and flipped at migration cutover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDocument {
    /// The entity this document routes
    pub object: ObjectIdentifier,
    /// Currently writable stream
    pub active_stream: StreamInfo,
    /// Last stream version observed by a successful commit on the active
    /// stream
    pub last_known_version: u64,
    /// Streams sealed by past migrations, oldest first
    pub terminated_streams: Vec<TerminatedStream>,
}

impl ObjectDocument {
    /// Fresh document routing an entity to its first stream
    pub fn new(object: ObjectIdentifier, stream_id: StreamId) -> Self {
        Self {
            object,
            active_stream: StreamInfo::new(stream_id),
            last_known_version: 0,
            terminated_streams: Vec::new(),
        }
    }

    /// True if the given stream is the entity's active stream
    pub fn is_active(&self, stream_id: &StreamId) -> bool {
        self.active_stream.stream_id == *stream_id
    }

    /// Continuation of a terminated stream, walking the recorded history.
    ///
    /// Returns `None` for the active stream and for streams this document
    /// has never seen.
    pub fn continuation_of(&self, stream_id: &StreamId) -> Option<&StreamId> {
        self.terminated_streams
            .iter()
            .find(|t| t.stream_id == *stream_id)
            .map(|t| &t.continuation)
    }

    /// Flip routing to a new active stream, recording the old one as
    /// terminated.
    pub fn cut_over(&mut self, terminated: TerminatedStream, new_active: StreamInfo, new_version: u64) {
        self.terminated_streams.push(terminated);
        self.active_stream = new_active;
        self.last_known_version = new_version;
    }

    /// Content hash used as the document-store CAS expectation
    pub fn hash(&self) -> Result<DocumentHash> {
        let bytes = serde_json::to_vec(self)?;
        Ok(DocumentHash(xxh3_64(&bytes)))
    }
}

/// Content hash of an [`ObjectDocument`], the compare-and-swap token for
/// document writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentHash(u64);

impl DocumentHash {
    /// Raw hash value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
