//! Event model
//!
//! An [`Event`] is immutable once appended: a type tag, a schema version for
//! upcast transforms, an opaque payload, a timestamp and a small metadata
//! map. A [`RecordedEvent`] is an event as read back from a stream, carrying
//! its zero-based position.
//!
//! One event type is reserved: [`CLOSURE_EVENT_TYPE`] seals a stream and
//! carries a pointer to its continuation stream. Closure events are written
//! through the same optimistic append path as business events but are never
//! copied during migration and never count as business events.

use crate::error::Result;
use crate::types::StreamId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved event type sealing a stream.
///
/// The `$` prefix keeps system events out of the business namespace.
pub const CLOSURE_EVENT_TYPE: &str = "$stream-closed";

/// Payload of a closure event
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClosurePayload {
    /// Stream that continues this entity's sequence
    continuation: StreamId,
}

/// An immutable event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// User-defined event category
    pub event_type: String,
    /// Schema version of the payload, for upcast transforms
    pub schema_version: u32,
    /// Opaque payload bytes; the engine mandates no wire format
    pub payload: Vec<u8>,
    /// Timestamp assigned when the event was created
    pub occurred_at: DateTime<Utc>,
    /// Small string-to-string metadata map (correlation ids, causation ids)
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    /// Create a new business event with the current timestamp and empty
    /// metadata
    pub fn new(event_type: impl Into<String>, schema_version: u32, payload: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            schema_version,
            payload,
            occurred_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, builder style
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Create the reserved closure event pointing at a continuation stream
    pub fn closure(continuation: &StreamId) -> Result<Self> {
        let payload = serde_json::to_vec(&ClosurePayload {
            continuation: continuation.clone(),
        })?;
        Ok(Self::new(CLOSURE_EVENT_TYPE, 1, payload))
    }

    /// True if this is the reserved closure event
    pub fn is_closure(&self) -> bool {
        self.event_type == CLOSURE_EVENT_TYPE
    }

    /// Continuation stream carried by a closure event.
    ///
    /// Returns `None` for business events and for closure payloads that do
    /// not decode.
    pub fn continuation(&self) -> Option<StreamId> {
        if !self.is_closure() {
            return None;
        }
        serde_json::from_slice::<ClosurePayload>(&self.payload)
            .ok()
            .map(|p| p.continuation)
    }
}

/// An event as read back from a stream, with its assigned position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Zero-based position within the stream
    pub version: u64,
    /// The recorded event
    pub event: Event,
}

impl RecordedEvent {
    /// Pair an event with its stream position
    pub fn new(version: u64, event: Event) -> Self {
        Self { version, event }
    }
}
