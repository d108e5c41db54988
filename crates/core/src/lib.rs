//! Core types and traits for Lodestream
//!
//! This crate defines the foundational types used throughout the system:
//! - ObjectIdentifier: Unique identifier for an entity (object name + id)
//! - StreamId: Identifier for one append-only event stream
//! - VersionToken: Sortable cross-boundary address of one event position
//! - Event / RecordedEvent: Immutable event payloads and their stream positions
//! - ObjectDocument: Persisted entity -> active-stream routing metadata
//! - Error: Error type hierarchy
//! - Traits: External interface contracts (StorageBackend, DocumentStore)
//! - CancellationToken: Cooperative cancellation for long-running loops

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod document;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use cancel::CancellationToken;
pub use document::{DocumentHash, ObjectDocument, StreamInfo, TerminatedStream};
pub use error::{Error, Result};
pub use event::{Event, RecordedEvent, CLOSURE_EVENT_TYPE};
pub use traits::{DiscoveryPage, DocumentStore, ReadPage, StorageBackend};
pub use types::{ContinuationToken, ObjectIdentifier, StreamId, VersionToken};
