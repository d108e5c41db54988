//! Crash-resume scenarios
//!
//! The orchestrator must tolerate re-entry mid-saga: the seal state of the
//! source stream is authoritative, so a run that died after the close but
//! before the routing update resumes directly at the routing update.

use crate::common::{event_number, order_event, test_object, TestWorld};
use lodestream::{
    CancellationToken, CatchUpCopier, MigrationRecord, MigrationRecordStore, MigrationStatus,
    StorageBackend, StreamId, CLOSURE_EVENT_TYPE,
};
use std::sync::Arc;

#[test]
fn reentry_after_close_resumes_at_routing_update() {
    let world = TestWorld::new();
    let object = test_object();
    let router = world.router(&object);
    for n in 0..6u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let source = world.document(&object).active_stream.stream_id.clone();
    let target = StreamId::new("order-42-target");

    // A previous run copied everything and closed the source, then died
    // before the routing update
    let copier = CatchUpCopier::new(
        Arc::clone(&world.backend) as Arc<dyn StorageBackend>,
        source.clone(),
        target.clone(),
    );
    let mut progress = copier.seed_progress(None).unwrap();
    copier.copy_once(&mut progress).unwrap();
    let source_stream = router.stream(source.clone());
    source_stream.append_closure(6, &target).unwrap();
    let mut record = MigrationRecord::new(object.clone(), source.clone(), target.clone());
    record.transition(MigrationStatus::CuttingOver);
    record.copied_source_version = 6;
    world.records.save(&record).unwrap();
    assert!(world.document(&object).is_active(&source));

    // Re-entry: no second close is attempted, routing gets updated
    let report = world
        .orchestrator()
        .migrate(&object, &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(report.source_final_version, 7);

    let source_events = world.events(&source);
    let closures = source_events
        .iter()
        .filter(|r| r.event.event_type == CLOSURE_EVENT_TYPE)
        .count();
    assert_eq!(closures, 1, "close must not be re-attempted on re-entry");

    let doc = world.document(&object);
    assert!(doc.is_active(&target));
    assert_eq!(doc.continuation_of(&source), Some(&target));

    // Writers carry on against the target
    let outcome = router.append(vec![order_event(6)]).unwrap();
    assert_eq!(outcome.stream_id, target);
    assert_eq!(outcome.version, 7);
}

#[test]
fn reentry_after_cutover_just_finishes_bookkeeping() {
    let world = TestWorld::new();
    let object = test_object();
    let router = world.router(&object);
    for n in 0..4u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let target = StreamId::new("order-42-target");
    world
        .orchestrator()
        .migrate(&object, &target, &CancellationToken::new())
        .unwrap();

    // Drop the record's completion on the floor, as a crash between the
    // routing update and the final record save would
    let mut record = world.records.load(&object).unwrap().unwrap();
    record.transition(MigrationStatus::CuttingOver);
    world.records.save(&record).unwrap();

    let report = world
        .orchestrator()
        .migrate(&object, &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(world.events(&target).len(), 4);
    assert_eq!(
        world.records.load(&object).unwrap().unwrap().status,
        MigrationStatus::Completed
    );
}

#[test]
fn cancellation_preserves_progress_and_migration_resumes() {
    let world = TestWorld::new();
    let object = test_object();
    let router = world.router(&object);
    for n in 0..9u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let source = world.document(&object).active_stream.stream_id.clone();
    let target = StreamId::new("order-42-target");

    // A cancelled saga stops at the next loop boundary without sealing
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let report = world
        .orchestrator()
        .migrate(&object, &target, &cancelled)
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Cancelled);
    assert!(
        world.events(&source).iter().all(|r| !r.event.is_closure()),
        "a cancelled migration must not seal the source"
    );
    assert!(world.document(&object).is_active(&source));

    // Copy work done before the resumption survives; the resumed saga
    // detects it and goes straight to the close
    let copier = CatchUpCopier::new(
        Arc::clone(&world.backend) as Arc<dyn StorageBackend>,
        source.clone(),
        target.clone(),
    );
    let mut progress = copier.seed_progress(None).unwrap();
    copier.copy_once(&mut progress).unwrap();
    let resumed = world
        .orchestrator()
        .migrate(&object, &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(resumed.status, MigrationStatus::Completed);
    let numbers: Vec<u32> = world
        .events(&target)
        .iter()
        .map(|r| event_number(&r.event))
        .collect();
    assert_eq!(numbers, (0..9).collect::<Vec<u32>>());
}
