//! Catch-up copying
//!
//! Iteratively copies not-yet-replicated business events from the source
//! stream to the target, preserving source order and excluding closure
//! events, optionally through a [`TransformHook`]. The copier runs while
//! application writers keep appending to the source; convergence is only
//! ever provisional and the orchestrator's atomic close is what makes it
//! final.
//!
//! Target appends use the target's own expected version, fully decoupled
//! from source numbering (a transform may fan one source event out to
//! several target events, or drop it).

use crate::record::MigrationRecord;
use crate::transform::{NoTransform, TransformHook};
use lode_core::cancel::CancellationToken;
use lode_core::error::Result;
use lode_core::traits::StorageBackend;
use lode_core::types::{ObjectIdentifier, StreamId};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// What to do when catch-up fails to converge within its bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergencePolicy {
    /// Keep looping until the attempt budget runs out
    KeepTrying,
    /// Fail the migration with `ConvergenceTimeout`
    Fail,
    /// Ask a [`SourcePauser`] to hold writers, then make a final pass
    PauseSource,
}

/// Out-of-band writer coordination for [`ConvergencePolicy::PauseSource`].
///
/// Admission control is an embedder concern; the engine only carries the
/// seam. `pause` returns false when the pauser cannot actually hold
/// writers, in which case the migration falls back to failing.
pub trait SourcePauser: Send + Sync {
    /// Hold new writes to the entity's source stream
    ///
    /// # Errors
    ///
    /// Returns an error if coordination itself fails.
    fn pause(&self, object: &ObjectIdentifier) -> Result<bool>;

    /// Let writes flow again. Called even after a failed migration.
    ///
    /// # Errors
    ///
    /// Returns an error if coordination itself fails.
    fn resume(&self, object: &ObjectIdentifier) -> Result<()>;
}

/// Copy position, advanced by every pass and persisted with the migration
/// record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyProgress {
    /// Source events consumed so far (next source version to read)
    pub copied_source_version: u64,
    /// Target stream version (CAS expectation for the next append)
    pub target_version: u64,
    /// Target events written by this copier instance
    pub events_copied: u64,
}

/// Iterative source-to-target event copier
pub struct CatchUpCopier {
    backend: Arc<dyn StorageBackend>,
    source: StreamId,
    target: StreamId,
    transform: Arc<dyn TransformHook>,
    page_size: usize,
}

impl CatchUpCopier {
    /// Copier over a source/target pair with no transform
    pub fn new(backend: Arc<dyn StorageBackend>, source: StreamId, target: StreamId) -> Self {
        Self {
            backend,
            source,
            target,
            transform: Arc::new(NoTransform),
            page_size: 256,
        }
    }

    /// Install a transform hook
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn TransformHook>) -> Self {
        self.transform = transform;
        self
    }

    /// Override the read page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Source version counting business events only (a trailing closure
    /// event is excluded)
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn source_business_version(&self) -> Result<u64> {
        let version = self.backend.stream_version(&self.source)?;
        if version == 0 {
            return Ok(0);
        }
        let tail = self
            .backend
            .read_range(&self.source, version - 1, Some(version), 1)?;
        let sealed = tail
            .events
            .last()
            .is_some_and(|recorded| recorded.event.is_closure());
        Ok(if sealed { version - 1 } else { version })
    }

    /// Initial progress for a (possibly resumed) migration.
    ///
    /// A record that has consumed source events carries the authoritative
    /// position; otherwise the target count seeds it, which is exact for
    /// transform-free copying and trivially zero for a fresh target.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn seed_progress(&self, record: Option<&MigrationRecord>) -> Result<CopyProgress> {
        let target_version = self.backend.stream_version(&self.target)?;
        let copied_source_version = match record {
            Some(r) if r.copied_source_version > 0 => r.copied_source_version,
            _ => target_version,
        };
        Ok(CopyProgress {
            copied_source_version,
            target_version,
            events_copied: 0,
        })
    }

    /// True once every source business event has been consumed
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn is_converged(&self, progress: &CopyProgress) -> Result<bool> {
        Ok(progress.copied_source_version >= self.source_business_version()?)
    }

    /// One copy pass: page through un-consumed source events, transform,
    /// append to the target. Returns the number of target events written.
    ///
    /// Idempotent over a converged pair: reads nothing, writes nothing.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` on the target means another copier instance
    /// owns it now (a resumed migration elsewhere); surfaced untouched.
    pub fn copy_once(&self, progress: &mut CopyProgress) -> Result<u64> {
        let mut copied = 0u64;
        loop {
            let business_end = self.source_business_version()?;
            if progress.copied_source_version >= business_end {
                break;
            }
            let page = self.backend.read_range(
                &self.source,
                progress.copied_source_version,
                Some(business_end),
                self.page_size,
            )?;
            let Some(last) = page.events.last() else {
                break;
            };
            let consumed = last.version + 1;
            let mut outputs = Vec::with_capacity(page.events.len());
            for recorded in &page.events {
                // Closure events never replicate; the bound above already
                // excludes a trailing one
                if recorded.event.is_closure() {
                    continue;
                }
                if self
                    .transform
                    .applies_to(&recorded.event.event_type, recorded.event.schema_version)
                {
                    outputs.extend(self.transform.transform(&recorded.event)?);
                } else {
                    outputs.push(recorded.event.clone());
                }
            }
            if !outputs.is_empty() {
                progress.target_version =
                    self.backend
                        .append(&self.target, progress.target_version, &outputs)?;
                copied += outputs.len() as u64;
            }
            progress.copied_source_version = consumed;
        }
        progress.events_copied += copied;
        Ok(copied)
    }

    /// Loop copy passes until converged, at most `max_rounds` times,
    /// sleeping `delay` between non-converged rounds. Checks cancellation
    /// at every loop boundary; already-copied progress survives a
    /// cancellation.
    ///
    /// Returns whether the pair converged.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the token fires; storage errors from the passes.
    pub fn run_to_convergence(
        &self,
        progress: &mut CopyProgress,
        max_rounds: u32,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        for round in 0..max_rounds {
            cancel.check()?;
            let copied = self.copy_once(progress)?;
            if self.is_converged(progress)? {
                debug!(
                    source = %self.source,
                    target = %self.target,
                    round,
                    copied,
                    "catch-up converged"
                );
                return Ok(true);
            }
            debug!(
                source = %self.source,
                target = %self.target,
                round,
                copied,
                "catch-up round done, source still ahead"
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        self.is_converged(progress)
    }
}
