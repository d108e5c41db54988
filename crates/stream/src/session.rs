//! Append sessions
//!
//! A [`Session`] buffers appends against the stream version observed when
//! the session was opened. No I/O happens until `commit`, which submits the
//! whole buffer as one all-or-nothing compare-and-swap append. A conflict at
//! commit means another writer (or the migration close) got there first; the
//! caller decides the retry policy.

use crate::stream::EventStream;
use lode_core::error::Result;
use lode_core::event::Event;
use lode_core::types::VersionToken;

/// Existence constraint checked when a session is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenConstraint {
    /// The stream must not exist yet (fails `StreamAlreadyExists`)
    New,
    /// The stream must already exist (fails `StreamNotFound`)
    Existing,
    /// No existence check
    Loose,
}

/// A buffered batch of appends bound to one observed stream version
#[derive(Debug)]
pub struct Session {
    stream: EventStream,
    base_version: u64,
    buffered: Vec<Event>,
}

impl Session {
    pub(crate) fn new(stream: EventStream, base_version: u64) -> Self {
        Self {
            stream,
            base_version,
            buffered: Vec::new(),
        }
    }

    /// Stream version observed at open; the commit's CAS expectation
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Number of buffered, not-yet-committed events
    pub fn pending(&self) -> usize {
        self.buffered.len()
    }

    /// Buffer an event, assigning the next sequential version.
    ///
    /// Returns the token the event will occupy once the session commits.
    /// No I/O happens here.
    ///
    /// # Errors
    ///
    /// `MalformedToken` if the entity's names cannot form a token.
    pub fn append(&mut self, event: Event) -> Result<VersionToken> {
        let version = self.base_version + self.buffered.len() as u64;
        let token =
            VersionToken::for_object(self.stream.object(), self.stream.stream_id(), version)?;
        self.buffered.push(event);
        Ok(token)
    }

    /// Submit the buffer under the expected version observed at open.
    ///
    /// All-or-nothing: either every buffered event lands, or none do.
    /// An empty session commits as a no-op and returns the base version.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` if another commit moved the stream version;
    /// `StreamClosed` if the stream was sealed in the meantime.
    pub fn commit(self) -> Result<u64> {
        self.stream.commit_batch(self.base_version, &self.buffered)
    }
}
