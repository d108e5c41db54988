//! Migration orchestrator
//!
//! The saga coordinating one entity's live stream relocation:
//!
//! ```text
//! AcquireLock -> Backup? -> Analyze -> [Copy&Transform -> Verify? -> AtomicClose]*
//!             -> RoutingUpdate -> BookClose? -> ReleaseLock
//! ```
//!
//! Writers are never blocked: they race the copier on the source stream,
//! and the close event's expected-version append is the single point that
//! decides the race. A close conflict means new events arrived; the saga
//! loops back to catch-up, bounded by the configured attempt budget.
//!
//! Every state transition is persisted to the [`MigrationRecordStore`], and
//! the seal state of the source stream is treated as authoritative over the
//! record, so a process that dies anywhere in the saga can be resumed: lock
//! lease lapses, another orchestrator acquires it, detects the completed
//! steps and continues. Failures before the close leave the source
//! untouched; failures between close and routing update resume directly at
//! the routing update.

use crate::backup::{BackupHandle, BackupProvider};
use crate::copier::{CatchUpCopier, ConvergencePolicy, CopyProgress, SourcePauser};
use crate::heartbeat::LockHeartbeat;
use crate::lock::DistributedLockProvider;
use crate::record::{MigrationPhase, MigrationRecord, MigrationRecordStore, MigrationStatus};
use crate::transform::{NoTransform, TransformHook};
use chrono::Utc;
use lode_core::cancel::CancellationToken;
use lode_core::document::{StreamInfo, TerminatedStream};
use lode_core::error::{Error, Result};
use lode_core::traits::{DocumentStore, StorageBackend};
use lode_core::types::{ObjectIdentifier, StreamId};
use lode_stream::{EventStream, StreamConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Saga tunables
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Bound on waiting for the per-entity lock (fail fast past it)
    pub lock_timeout: Duration,
    /// Lock lease renewal interval
    pub heartbeat_interval: Duration,
    /// Total catch-up attempts (close-conflict cycles included) before the
    /// migration gives up with `ConvergenceTimeout`
    pub max_catch_up_attempts: u32,
    /// Copy rounds per attempt inside the copier loop
    pub convergence_rounds: u32,
    /// Delay between non-converged copy rounds
    pub catch_up_delay: Duration,
    /// What to do when an attempt ends without convergence
    pub convergence_policy: ConvergencePolicy,
    /// Run the integrity comparison between copy and close
    pub verify: bool,
    /// Snapshot the source before copying (needs a backup provider)
    pub backup: bool,
    /// Carry on when the backup step fails
    pub ignore_backup_failure: bool,
    /// Restore the source from backup when the saga fails before the close
    pub restore_on_failure: bool,
    /// Apply archival side effects after cutover
    pub book_close: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            max_catch_up_attempts: 5,
            convergence_rounds: 10,
            catch_up_delay: Duration::from_millis(50),
            convergence_policy: ConvergencePolicy::KeepTrying,
            verify: false,
            backup: false,
            ignore_backup_failure: false,
            restore_on_failure: false,
            book_close: false,
        }
    }
}

impl MigrationConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock acquisition timeout
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set the heartbeat renewal interval
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the total catch-up attempt budget
    #[must_use]
    pub fn with_max_catch_up_attempts(mut self, attempts: u32) -> Self {
        self.max_catch_up_attempts = attempts;
        self
    }

    /// Set the copy rounds per attempt
    #[must_use]
    pub fn with_convergence_rounds(mut self, rounds: u32) -> Self {
        self.convergence_rounds = rounds;
        self
    }

    /// Set the delay between non-converged copy rounds
    #[must_use]
    pub fn with_catch_up_delay(mut self, delay: Duration) -> Self {
        self.catch_up_delay = delay;
        self
    }

    /// Set the convergence-failure policy
    #[must_use]
    pub fn with_convergence_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.convergence_policy = policy;
        self
    }

    /// Enable the verification step
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Enable the backup step
    #[must_use]
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Tolerate backup failures
    #[must_use]
    pub fn with_ignore_backup_failure(mut self, ignore: bool) -> Self {
        self.ignore_backup_failure = ignore;
        self
    }

    /// Restore from backup when failing before the close
    #[must_use]
    pub fn with_restore_on_failure(mut self, restore: bool) -> Self {
        self.restore_on_failure = restore;
        self
    }

    /// Enable the book-close step
    #[must_use]
    pub fn with_book_close(mut self, book_close: bool) -> Self {
        self.book_close = book_close;
        self
    }
}

/// Terminal statistics of one migration run
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Migrated entity
    pub object: ObjectIdentifier,
    /// Drained stream
    pub source_stream: StreamId,
    /// Filled stream
    pub target_stream: StreamId,
    /// Terminal saga status
    pub status: MigrationStatus,
    /// Target events written by this run
    pub events_copied: u64,
    /// Catch-up attempts consumed over the record's lifetime
    pub catch_up_attempts: u32,
    /// Source stream version at the end (closure event included)
    pub source_final_version: u64,
    /// Target stream version at the end
    pub target_final_version: u64,
    /// Wall-clock duration of this run
    pub duration: Duration,
}

/// Saga coordinator for live stream migrations
pub struct MigrationOrchestrator {
    backend: Arc<dyn StorageBackend>,
    documents: Arc<dyn DocumentStore>,
    locks: Arc<dyn DistributedLockProvider>,
    records: Arc<dyn MigrationRecordStore>,
    transform: Arc<dyn TransformHook>,
    has_transform: bool,
    backup_provider: Option<Arc<dyn BackupProvider>>,
    pauser: Option<Arc<dyn SourcePauser>>,
    config: MigrationConfig,
    stream_config: StreamConfig,
}

impl MigrationOrchestrator {
    /// Orchestrator over the given stores, with default configuration
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        documents: Arc<dyn DocumentStore>,
        locks: Arc<dyn DistributedLockProvider>,
        records: Arc<dyn MigrationRecordStore>,
    ) -> Self {
        Self {
            backend,
            documents,
            locks,
            records,
            transform: Arc::new(NoTransform),
            has_transform: false,
            backup_provider: None,
            pauser: None,
            config: MigrationConfig::default(),
            stream_config: StreamConfig::default(),
        }
    }

    /// Replace the saga configuration
    #[must_use]
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the stream-engine configuration used for source/target access
    #[must_use]
    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }

    /// Install a transform hook applied during copying
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn TransformHook>) -> Self {
        self.transform = transform;
        self.has_transform = true;
        self
    }

    /// Install a backup provider for the backup/rollback steps
    #[must_use]
    pub fn with_backup_provider(mut self, provider: Arc<dyn BackupProvider>) -> Self {
        self.backup_provider = Some(provider);
        self
    }

    /// Install a source pauser for `ConvergencePolicy::PauseSource`
    #[must_use]
    pub fn with_source_pauser(mut self, pauser: Arc<dyn SourcePauser>) -> Self {
        self.pauser = Some(pauser);
        self
    }

    /// Lock key guarding one entity's migrations
    fn lock_key(object: &ObjectIdentifier) -> String {
        format!("migration/{}/{}", object.object_name, object.object_id)
    }

    /// Migrate an entity's active stream to `target`.
    ///
    /// Returns a report for `Completed` and `Cancelled` runs (cooperative
    /// cancellation is not an error; copied progress is preserved for
    /// resumption). Failures are typed errors; the persisted record then
    /// carries `Failed` and the source is untouched whenever the failure
    /// happened before the atomic close.
    ///
    /// Safe to re-enter: a run that died mid-saga is picked up where it
    /// left off.
    ///
    /// # Errors
    ///
    /// `LockUnavailable` when another migration holds the entity;
    /// `ConvergenceTimeout` when catch-up exhausts its budget; `Integrity`
    /// on verification or continuation-chain violations; storage errors.
    pub fn migrate(
        &self,
        object: &ObjectIdentifier,
        target: &StreamId,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport> {
        let started = Instant::now();
        let lock_key = Self::lock_key(object);
        let handle = self
            .locks
            .acquire(&lock_key, self.config.lock_timeout)?
            .ok_or(Error::LockUnavailable {
                key: lock_key.clone(),
            })?;
        info!(object = %object, target = %target, "migration lock acquired");
        let heartbeat = LockHeartbeat::spawn(
            Arc::clone(&self.locks),
            handle,
            self.config.heartbeat_interval,
        );

        let outcome = self.run_saga(object, target, cancel, &heartbeat, started);

        let handle = heartbeat.stop();
        if let Err(e) = self.locks.release(&handle) {
            warn!(key = %handle.key, error = %e, "migration lock release failed");
        }
        outcome
    }

    fn run_saga(
        &self,
        object: &ObjectIdentifier,
        target: &StreamId,
        cancel: &CancellationToken,
        heartbeat: &LockHeartbeat,
        started: Instant,
    ) -> Result<MigrationReport> {
        let Some((doc, _)) = self.documents.get(object)? else {
            return Err(Error::DocumentNotFound {
                object: object.clone(),
            });
        };

        // Re-entry after a completed cutover: only book-close and record
        // upkeep remain
        if doc.is_active(target) {
            let source = doc
                .terminated_streams
                .iter()
                .rev()
                .find(|t| t.continuation == *target)
                .map(|t| t.stream_id.clone())
                .ok_or_else(|| {
                    Error::integrity(format!(
                        "routing already points at {target} but no terminated stream continues into it"
                    ))
                })?;
            info!(object = %object, "routing already cut over; finishing bookkeeping");
            let mut record = match self.records.load(object)? {
                Some(r) if r.target_stream == *target => r,
                _ => MigrationRecord::new(object.clone(), source.clone(), target.clone()),
            };
            return self.finish(&mut record, started, 0);
        }

        let source = doc.active_stream.stream_id.clone();
        let mut record = match self.records.load(object)? {
            Some(r) if !r.status.is_terminal() && r.target_stream != *target => {
                return Err(Error::integrity(format!(
                    "entity already has an in-flight migration targeting {}",
                    r.target_stream
                )));
            }
            Some(r) if !r.status.is_terminal() => {
                info!(object = %object, status = ?r.status, "resuming migration record");
                r
            }
            _ => MigrationRecord::new(object.clone(), source.clone(), target.clone()),
        };
        record.transition(MigrationStatus::InProgress);
        self.records.save(&record)?;

        let mut progress = CopyProgress::default();
        let mut backup_handle = None;
        let outcome = self.drive(
            object,
            &source,
            target,
            cancel,
            heartbeat,
            &mut record,
            &mut progress,
            &mut backup_handle,
        );

        match outcome {
            Ok(()) => self.finish(&mut record, started, progress.events_copied),
            Err(Error::Cancelled) => {
                record.transition(MigrationStatus::Cancelled);
                self.records.save(&record)?;
                info!(
                    object = %object,
                    copied = progress.events_copied,
                    "migration cancelled; copied progress preserved"
                );
                Ok(self.report(&record, started, progress.events_copied)?)
            }
            Err(e) => {
                self.rollback_if_configured(&mut record, &backup_handle);
                if !record.status.is_terminal() {
                    record.transition(MigrationStatus::Failed);
                }
                self.records.save(&record)?;
                warn!(object = %object, error = %e, "migration failed");
                Err(e)
            }
        }
    }

    /// Steps 3 through 8: backup, analyze, copy/verify/close cycle, routing
    /// update, book-close phase change.
    #[allow(clippy::too_many_arguments)]
    fn drive(
        &self,
        object: &ObjectIdentifier,
        source: &StreamId,
        target: &StreamId,
        cancel: &CancellationToken,
        heartbeat: &LockHeartbeat,
        record: &mut MigrationRecord,
        progress: &mut CopyProgress,
        backup_handle: &mut Option<BackupHandle>,
    ) -> Result<()> {
        let source_stream = self.event_stream(object, source);

        // The seal state on the source is authoritative over the record: a
        // run may have died between the close landing and the record being
        // saved
        let sealed = source_stream.sealed_tail()?;
        match sealed {
            Some((_, Some(continuation))) if continuation == *target => {
                info!(object = %object, "source already sealed; resuming at routing update");
            }
            Some((_, continuation)) => {
                return Err(Error::integrity(format!(
                    "source {source} is sealed with continuation {continuation:?}, not the migration target {target}"
                )));
            }
            None => {
                *backup_handle = self.backup_step(source)?;

                // Analyze: informational only
                let source_version = source_stream.version()?;
                info!(
                    object = %object,
                    source = %source,
                    source_version,
                    "analyzed source stream"
                );

                let copier = CatchUpCopier::new(
                    Arc::clone(&self.backend),
                    source.clone(),
                    target.clone(),
                )
                .with_transform(Arc::clone(&self.transform))
                .with_page_size(self.stream_config.read_page_size);
                *progress = copier.seed_progress(Some(record))?;

                self.copy_and_close(
                    object,
                    &source_stream,
                    target,
                    &copier,
                    cancel,
                    heartbeat,
                    record,
                    progress,
                )?;
            }
        }

        self.routing_update(object, source, target)?;
        record.enter_phase(MigrationPhase::Cutover);
        self.records.save(record)?;

        if self.config.book_close {
            // Archival side effects beyond sealing are delegated; the saga
            // records that the books are closed
            record.enter_phase(MigrationPhase::BookClosed);
            self.records.save(record)?;
            info!(object = %object, source = %source, "books closed for terminated stream");
        }
        Ok(())
    }

    /// The copy/verify/close cycle. A close conflict sends the saga back to
    /// catch-up; the attempt budget bounds the total number of cycles.
    #[allow(clippy::too_many_arguments)]
    fn copy_and_close(
        &self,
        object: &ObjectIdentifier,
        source_stream: &EventStream,
        target: &StreamId,
        copier: &CatchUpCopier,
        cancel: &CancellationToken,
        heartbeat: &LockHeartbeat,
        record: &mut MigrationRecord,
        progress: &mut CopyProgress,
    ) -> Result<()> {
        loop {
            if record.catch_up_attempts >= self.config.max_catch_up_attempts {
                return Err(Error::ConvergenceTimeout {
                    attempts: record.catch_up_attempts,
                });
            }
            record.catch_up_attempts += 1;
            cancel.check()?;
            if !heartbeat.is_healthy() {
                return Err(Error::LockExpired {
                    key: Self::lock_key(object),
                });
            }

            let converged = copier.run_to_convergence(
                progress,
                self.config.convergence_rounds,
                self.config.catch_up_delay,
                cancel,
            )?;
            record.copied_source_version = progress.copied_source_version;
            self.records.save(record)?;

            if !converged && !self.handle_divergence(object, copier, cancel, record, progress)? {
                continue;
            }

            if self.config.verify {
                record.transition(MigrationStatus::Verifying);
                self.records.save(record)?;
                self.verify_step(copier, target)?;
            }

            record.transition(MigrationStatus::CuttingOver);
            self.records.save(record)?;
            match source_stream.append_closure(progress.copied_source_version, target) {
                Ok(sealed_version) => {
                    info!(
                        object = %object,
                        sealed_version,
                        attempts = record.catch_up_attempts,
                        "source closed atomically"
                    );
                    return Ok(());
                }
                Err(Error::ConcurrencyConflict {
                    expected, actual, ..
                }) => {
                    warn!(
                        object = %object,
                        expected,
                        actual,
                        "events arrived during close; resuming catch-up"
                    );
                    record.transition(MigrationStatus::InProgress);
                    self.records.save(record)?;
                }
                Err(Error::StreamClosed { continuation, .. }) => {
                    // Already sealed: benign only if it points at our target
                    return if continuation.as_ref() == Some(target) {
                        Ok(())
                    } else {
                        Err(Error::integrity(format!(
                            "source sealed concurrently with continuation {continuation:?}"
                        )))
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply the convergence-failure policy. Returns true when the caller
    /// may proceed to verify/close, false to spend another attempt.
    fn handle_divergence(
        &self,
        object: &ObjectIdentifier,
        copier: &CatchUpCopier,
        cancel: &CancellationToken,
        record: &MigrationRecord,
        progress: &mut CopyProgress,
    ) -> Result<bool> {
        match self.config.convergence_policy {
            ConvergencePolicy::KeepTrying => {
                warn!(
                    object = %object,
                    attempt = record.catch_up_attempts,
                    "catch-up attempt ended without convergence"
                );
                Ok(false)
            }
            ConvergencePolicy::Fail => Err(Error::ConvergenceTimeout {
                attempts: record.catch_up_attempts,
            }),
            ConvergencePolicy::PauseSource => {
                let Some(pauser) = &self.pauser else {
                    warn!(object = %object, "pause-source policy without a pauser; failing");
                    return Err(Error::ConvergenceTimeout {
                        attempts: record.catch_up_attempts,
                    });
                };
                if !pauser.pause(object)? {
                    warn!(object = %object, "source pauser declined; failing");
                    return Err(Error::ConvergenceTimeout {
                        attempts: record.catch_up_attempts,
                    });
                }
                let final_pass = copier.run_to_convergence(
                    progress,
                    self.config.convergence_rounds,
                    self.config.catch_up_delay,
                    cancel,
                );
                if let Err(e) = pauser.resume(object) {
                    warn!(object = %object, error = %e, "source pauser resume failed");
                }
                if final_pass? {
                    Ok(true)
                } else {
                    Err(Error::ConvergenceTimeout {
                        attempts: record.catch_up_attempts,
                    })
                }
            }
        }
    }

    /// Optional backup of the source stream before anything is copied
    fn backup_step(&self, source: &StreamId) -> Result<Option<BackupHandle>> {
        if !self.config.backup {
            return Ok(None);
        }
        let Some(provider) = &self.backup_provider else {
            return Err(Error::integrity(
                "backup requested but no backup provider is configured".to_string(),
            ));
        };
        match provider.backup(source) {
            Ok(handle) => {
                info!(source = %source, backup = handle.as_str(), "source backed up");
                Ok(Some(handle))
            }
            Err(e) if self.config.ignore_backup_failure => {
                warn!(source = %source, error = %e, "backup failed; continuing as configured");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Integrity comparison between source and target.
    ///
    /// Count equality only holds for transform-free copying; with a
    /// transform installed the comparison is skipped (a transform may fan
    /// out or drop events by design).
    fn verify_step(&self, copier: &CatchUpCopier, target: &StreamId) -> Result<()> {
        if self.has_transform {
            debug!("verification skipped: transform installed");
            return Ok(());
        }
        let source_events = copier.source_business_version()?;
        let target_events = self.backend.stream_version(target)?;
        if source_events != target_events {
            return Err(Error::integrity(format!(
                "verification mismatch: source holds {source_events} business events, target holds {target_events}"
            )));
        }
        Ok(())
    }

    /// Step 7: flip routing to the target and record the terminated source.
    ///
    /// Idempotent: a document already pointing at the target is left alone,
    /// so re-entry after a crash lands here harmlessly.
    fn routing_update(
        &self,
        object: &ObjectIdentifier,
        source: &StreamId,
        target: &StreamId,
    ) -> Result<()> {
        for _ in 0..=self.stream_config.document_update_retries {
            let Some((mut doc, hash)) = self.documents.get(object)? else {
                return Err(Error::DocumentNotFound {
                    object: object.clone(),
                });
            };
            if doc.is_active(target) {
                return Ok(());
            }
            if !doc.is_active(source) {
                return Err(Error::integrity(format!(
                    "routing for {object} points at {} rather than source or target",
                    doc.active_stream.stream_id
                )));
            }
            let termination_version = self.backend.stream_version(source)?;
            let target_version = self.backend.stream_version(target)?;
            doc.cut_over(
                TerminatedStream {
                    stream_id: source.clone(),
                    termination_version,
                    continuation: target.clone(),
                    terminated_at: Utc::now(),
                },
                StreamInfo::new(target.clone()),
                target_version,
            );
            match self.documents.set(&doc, Some(hash)) {
                Ok(_) => {
                    info!(
                        object = %object,
                        source = %source,
                        target = %target,
                        termination_version,
                        "routing cut over"
                    );
                    return Ok(());
                }
                Err(Error::DocumentConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::DocumentConflict {
            object: object.clone(),
        })
    }

    /// Restore the source from backup after a pre-close failure, when
    /// configured. Post-close failures never roll back.
    fn rollback_if_configured(
        &self,
        record: &mut MigrationRecord,
        backup_handle: &Option<BackupHandle>,
    ) {
        if !self.config.restore_on_failure {
            return;
        }
        let (Some(provider), Some(handle)) = (&self.backup_provider, backup_handle) else {
            return;
        };
        record.transition(MigrationStatus::RollingBack);
        if self.records.save(record).is_err() {
            warn!(object = %record.object, "failed to persist rolling-back status");
        }
        match provider.restore(handle) {
            Ok(()) => {
                record.transition(MigrationStatus::RolledBack);
                info!(object = %record.object, "source restored from backup");
            }
            Err(e) => {
                // Stays RollingBack for operator attention
                warn!(object = %record.object, error = %e, "restore from backup failed");
            }
        }
    }

    fn finish(
        &self,
        record: &mut MigrationRecord,
        started: Instant,
        events_copied: u64,
    ) -> Result<MigrationReport> {
        record.transition(MigrationStatus::Completed);
        self.records.save(record)?;
        let report = self.report(record, started, events_copied)?;
        info!(
            object = %report.object,
            events_copied = report.events_copied,
            attempts = report.catch_up_attempts,
            duration_ms = report.duration.as_millis() as u64,
            "migration completed"
        );
        Ok(report)
    }

    fn report(
        &self,
        record: &MigrationRecord,
        started: Instant,
        events_copied: u64,
    ) -> Result<MigrationReport> {
        Ok(MigrationReport {
            object: record.object.clone(),
            source_stream: record.source_stream.clone(),
            target_stream: record.target_stream.clone(),
            status: record.status,
            events_copied,
            catch_up_attempts: record.catch_up_attempts,
            source_final_version: self.backend.stream_version(&record.source_stream)?,
            target_final_version: self.backend.stream_version(&record.target_stream)?,
            duration: started.elapsed(),
        })
    }

    fn event_stream(&self, object: &ObjectIdentifier, stream_id: &StreamId) -> EventStream {
        EventStream::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.documents),
            object.clone(),
            stream_id.clone(),
            self.stream_config.clone(),
        )
    }
}
