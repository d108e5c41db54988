//! Failure semantics
//!
//! Failures before the atomic close leave the source untouched and the
//! migration safe to retry later. Locks bound concurrent migrations of the
//! same entity; a stale close never seals.

use crate::common::{order_event, test_object, TestWorld};
use lodestream::{
    BackupHandle, BackupProvider, CancellationToken, ConvergencePolicy, DistributedLockProvider,
    Error, MigrationConfig, MigrationOrchestrator, MigrationRecordStore, MigrationStatus, Result,
    StorageBackend, StreamId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn populated_world() -> (TestWorld, StreamId) {
    let world = TestWorld::new();
    let router = world.router(&test_object());
    for n in 0..5u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let source = world.document(&test_object()).active_stream.stream_id.clone();
    (world, source)
}

#[test]
fn convergence_timeout_fails_without_touching_the_source() {
    let (world, source) = populated_world();
    let target = StreamId::new("order-42-target");

    // Zero copy rounds per attempt: the copier can never converge
    let config = MigrationConfig::new()
        .with_convergence_rounds(0)
        .with_convergence_policy(ConvergencePolicy::Fail);
    let err = world
        .orchestrator()
        .with_config(config)
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::ConvergenceTimeout { .. }));

    // Source untouched: no closure event, routing unchanged, still writable
    assert!(world.events(&source).iter().all(|r| !r.event.is_closure()));
    assert!(world.document(&test_object()).is_active(&source));
    let record = world.records.load(&test_object()).unwrap().unwrap();
    assert_eq!(record.status, MigrationStatus::Failed);

    world
        .router(&test_object())
        .append(vec![order_event(5)])
        .unwrap();
}

#[test]
fn keep_trying_policy_is_bounded_by_the_attempt_budget() {
    let (world, _source) = populated_world();
    let target = StreamId::new("order-42-target");

    let config = MigrationConfig::new()
        .with_convergence_rounds(0)
        .with_max_catch_up_attempts(3)
        .with_convergence_policy(ConvergencePolicy::KeepTrying);
    let err = world
        .orchestrator()
        .with_config(config)
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::ConvergenceTimeout { attempts: 3 }));
}

#[test]
fn held_lock_makes_concurrent_migration_fail_fast() {
    let (world, _source) = populated_world();
    let target = StreamId::new("order-42-target");

    // Another process holds the entity's migration lock
    let _held = world
        .locks
        .acquire("migration/order/42", Duration::from_millis(10))
        .unwrap()
        .unwrap();

    let config = MigrationConfig::new().with_lock_timeout(Duration::from_millis(40));
    let err = world
        .orchestrator()
        .with_config(config)
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::LockUnavailable { .. }));

    // Nothing was recorded for a migration that never got the lock
    assert!(world.records.load(&test_object()).unwrap().is_none());
}

#[test]
fn migrating_unknown_entity_fails_cleanly() {
    let world = TestWorld::new();
    let err = world
        .orchestrator()
        .migrate(
            &test_object(),
            &StreamId::new("order-42-target"),
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound { .. }));
}

#[test]
fn backup_failure_aborts_unless_configured_otherwise() {
    struct FailingBackup;
    impl BackupProvider for FailingBackup {
        fn backup(&self, _stream: &StreamId) -> Result<BackupHandle> {
            Err(Error::storage("backup volume offline"))
        }
        fn restore(&self, _handle: &BackupHandle) -> Result<()> {
            Ok(())
        }
    }

    let (world, source) = populated_world();
    let target = StreamId::new("order-42-target");

    let orchestrator = |ignore: bool| -> MigrationOrchestrator {
        world
            .orchestrator()
            .with_backup_provider(Arc::new(FailingBackup))
            .with_config(
                MigrationConfig::new()
                    .with_backup(true)
                    .with_ignore_backup_failure(ignore),
            )
    };

    let err = orchestrator(false)
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap_err();
    assert!(err.is_retryable(), "backup failure surfaces the storage error");
    assert!(world.events(&source).iter().all(|r| !r.event.is_closure()));

    // Configured to ignore, the same migration sails through
    let report = orchestrator(true)
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
}

#[test]
fn verification_passes_for_faithful_copy() {
    let (world, _source) = populated_world();
    let target = StreamId::new("order-42-target");

    let report = world
        .orchestrator()
        .with_config(MigrationConfig::new().with_verify(true))
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(report.events_copied, 5);
}

/// Backend decorator that lets one last event "arrive" on the stream right
/// before the first closure append, forcing the close into a conflict.
struct AmbushedBackend {
    inner: Arc<lodestream::InMemoryBackend>,
    ambushed: AtomicBool,
}

impl StorageBackend for AmbushedBackend {
    fn append(&self, stream: &StreamId, expected: u64, events: &[lodestream::Event]) -> Result<u64> {
        let closing = events.iter().any(lodestream::Event::is_closure);
        if closing && !self.ambushed.swap(true, Ordering::SeqCst) {
            self.inner.append(stream, expected, &[order_event(99)])?;
        }
        self.inner.append(stream, expected, events)
    }

    fn read_range(
        &self,
        stream: &StreamId,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> Result<lodestream::ReadPage> {
        self.inner.read_range(stream, from, to, limit)
    }

    fn stream_version(&self, stream: &StreamId) -> Result<u64> {
        self.inner.stream_version(stream)
    }

    fn exists(&self, stream: &StreamId) -> Result<bool> {
        self.inner.exists(stream)
    }
}

#[test]
fn conflicted_close_does_not_seal_and_the_saga_catches_up_again() {
    let (world, source) = populated_world();
    let target = StreamId::new("order-42-target");

    let ambush = Arc::new(AmbushedBackend {
        inner: Arc::clone(&world.backend),
        ambushed: AtomicBool::new(false),
    });
    let orchestrator = MigrationOrchestrator::new(
        ambush as Arc<dyn StorageBackend>,
        Arc::clone(&world.documents) as Arc<dyn lodestream::DocumentStore>,
        Arc::clone(&world.locks) as Arc<dyn DistributedLockProvider>,
        Arc::clone(&world.records) as Arc<dyn MigrationRecordStore>,
    );

    let report = orchestrator
        .migrate(&test_object(), &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    // First close conflicted, second attempt caught up and won
    assert_eq!(report.catch_up_attempts, 2);
    assert_eq!(report.events_copied, 6);
    assert_eq!(report.source_final_version, 7);
    assert_eq!(report.target_final_version, 6);

    // The stale close sealed nothing; exactly one closure event exists,
    // after the late arrival
    let source_events = world.events(&source);
    assert_eq!(source_events.len(), 7);
    assert!(source_events[..6].iter().all(|r| !r.event.is_closure()));
    assert!(source_events[6].event.is_closure());
    assert!(world.document(&test_object()).is_active(&target));
}
