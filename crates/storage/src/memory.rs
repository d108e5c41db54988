//! In-memory event storage
//!
//! Reference [`StorageBackend`]: per-stream event vectors behind a single
//! `RwLock`. The expected-version check and the batch append happen under
//! one write-lock acquisition, which is what gives the compare-and-swap its
//! atomicity here; durable backends get the same property from conditional
//! writes.

use lode_core::error::{Error, Result};
use lode_core::event::{Event, RecordedEvent};
use lode_core::traits::{ReadPage, StorageBackend};
use lode_core::types::StreamId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory `StorageBackend` implementation
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    streams: RwLock<HashMap<StreamId, Vec<Event>>>,
}

impl InMemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams with at least one event (test/diagnostic aid)
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }
}

impl StorageBackend for InMemoryBackend {
    fn append(&self, stream: &StreamId, expected_version: u64, events: &[Event]) -> Result<u64> {
        let mut streams = self.streams.write();
        let entry = streams.entry(stream.clone()).or_default();
        let actual = entry.len() as u64;
        if actual != expected_version {
            // Roll back the implicit creation so a failed create leaves no
            // empty stream behind
            if entry.is_empty() {
                streams.remove(stream);
            }
            return Err(Error::ConcurrencyConflict {
                stream: stream.clone(),
                expected: expected_version,
                actual,
            });
        }
        entry.extend_from_slice(events);
        Ok(entry.len() as u64)
    }

    fn read_range(
        &self,
        stream: &StreamId,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> Result<ReadPage> {
        let streams = self.streams.read();
        let Some(events) = streams.get(stream) else {
            return Ok(ReadPage {
                events: Vec::new(),
                next: None,
            });
        };
        let len = events.len() as u64;
        let end = to.map_or(len, |t| t.min(len));
        if from >= end {
            return Ok(ReadPage {
                events: Vec::new(),
                next: None,
            });
        }
        let page_end = end.min(from + limit as u64);
        let page: Vec<RecordedEvent> = events[from as usize..page_end as usize]
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, event)| RecordedEvent::new(from + i as u64, event))
            .collect();
        let next = (page_end < end).then_some(page_end);
        Ok(ReadPage { events: page, next })
    }

    fn stream_version(&self, stream: &StreamId) -> Result<u64> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .map_or(0, |events| events.len() as u64))
    }

    fn exists(&self, stream: &StreamId) -> Result<bool> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .is_some_and(|events| !events.is_empty()))
    }
}
