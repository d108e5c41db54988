//! Error types for Lodestream
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! The taxonomy separates recoverable coordination failures (version
//! conflicts, closed streams, unavailable locks) from transient storage
//! faults and from fatal integrity violations. Conflicts are never blindly
//! retried by the core: each is either surfaced as a typed error or retried
//! under an explicit bounded policy chosen by the caller.

use crate::types::{ObjectIdentifier, StreamId};
use std::io;
use thiserror::Error;

/// Result type alias for Lodestream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Lodestream engine
#[derive(Debug, Error)]
pub enum Error {
    /// Expected-version mismatch on an optimistic append.
    ///
    /// Recoverable: re-read the stream and retry under a bounded policy.
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Stream the append was issued against
        stream: StreamId,
        /// Version the writer expected
        expected: u64,
        /// Version actually found in storage
        actual: u64,
    },

    /// The stream has been sealed by a closure event.
    ///
    /// Recoverable: follow the continuation (bounded hop) and retry there.
    #[error("stream {stream} is closed{}", .continuation.as_ref().map(|c| format!(", continued by {c}")).unwrap_or_default())]
    StreamClosed {
        /// The sealed stream
        stream: StreamId,
        /// Successor stream, when the closure event carries one
        continuation: Option<StreamId>,
    },

    /// Stream does not exist but the operation requires it
    #[error("stream not found: {stream}")]
    StreamNotFound {
        /// The missing stream
        stream: StreamId,
    },

    /// Stream already exists but the operation forbids it
    #[error("stream already exists: {stream}")]
    StreamAlreadyExists {
        /// The offending stream
        stream: StreamId,
    },

    /// Document-store compare-and-swap failed (stale hash)
    #[error("document conflict for object {object}")]
    DocumentConflict {
        /// The contended object
        object: ObjectIdentifier,
    },

    /// No document exists for the object
    #[error("document not found for object {object}")]
    DocumentNotFound {
        /// The unknown object
        object: ObjectIdentifier,
    },

    /// Distributed lock could not be acquired within the timeout
    #[error("lock unavailable: {key}")]
    LockUnavailable {
        /// The contended lock key
        key: String,
    },

    /// Lock lease lapsed while the holder still believed it owned it
    #[error("lock lease expired: {key}")]
    LockExpired {
        /// The lapsed lock key
        key: String,
    },

    /// Catch-up copying did not converge within the configured bounds
    #[error("migration failed to converge after {attempts} catch-up attempts")]
    ConvergenceTimeout {
        /// Total catch-up attempts consumed
        attempts: u32,
    },

    /// Continuation chain exceeded the configured redirect bound
    #[error("continuation hop limit exceeded after {hops} hops")]
    HopLimitExceeded {
        /// Number of hops taken before giving up
        hops: u32,
    },

    /// Irrecoverable integrity violation (verification mismatch, broken
    /// continuation chain). Fatal: requires operator intervention.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Cooperative cancellation observed at a loop boundary
    #[error("operation cancelled")]
    Cancelled,

    /// Token or identifier string did not parse
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage layer error (transient; retried with backoff at the boundary)
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a storage-layer error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create an integrity-violation error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    /// True for expected-version mismatches
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }

    /// True when the stream was sealed by a closure event
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, Error::StreamClosed { .. })
    }

    /// True for transient faults that may be retried with backoff.
    ///
    /// Conflicts are deliberately excluded: they carry semantic meaning and
    /// must go through re-read-and-retry, never a blind replay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }

    /// Continuation stream of a `StreamClosed` error, if any
    pub fn closed_continuation(&self) -> Option<&StreamId> {
        match self {
            Error::StreamClosed { continuation, .. } => continuation.as_ref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
