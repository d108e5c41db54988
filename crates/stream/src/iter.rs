//! Lazy paginated stream reads

use lode_core::error::Result;
use lode_core::event::RecordedEvent;
use lode_core::traits::StorageBackend;
use lode_core::types::StreamId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Iterator over a version range of a stream, fetching one bounded page per
/// backend call.
///
/// A backend error ends the iteration after being yielded once.
pub struct EventIter {
    backend: Arc<dyn StorageBackend>,
    stream_id: StreamId,
    cursor: u64,
    end: Option<u64>,
    page_size: usize,
    buffered: VecDeque<RecordedEvent>,
    done: bool,
}

impl EventIter {
    pub(crate) fn new(
        backend: Arc<dyn StorageBackend>,
        stream_id: StreamId,
        from: u64,
        to: Option<u64>,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            stream_id,
            cursor: from,
            end: to,
            page_size: page_size.max(1),
            buffered: VecDeque::new(),
            done: false,
        }
    }
}

impl Iterator for EventIter {
    type Item = Result<RecordedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.buffered.pop_front() {
            return Some(Ok(event));
        }
        if self.done {
            return None;
        }
        match self
            .backend
            .read_range(&self.stream_id, self.cursor, self.end, self.page_size)
        {
            Ok(page) => {
                match page.next {
                    Some(next) => self.cursor = next,
                    None => self.done = true,
                }
                self.buffered.extend(page.events);
                match self.buffered.pop_front() {
                    Some(event) => Some(Ok(event)),
                    None => {
                        self.done = true;
                        None
                    }
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
