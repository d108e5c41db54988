//! The canonical live-migration scenario
//!
//! Source holds E1..E10; while the migration is copying, E11 and E12 arrive
//! on the source; catch-up copies E1..E12; the close succeeds with expected
//! version 12; the source is sealed at version 13 (the close event);
//! routing flips to the target; a subsequent write lands on the target at
//! the correct next version. No gap, no duplicate.

use crate::common::{event_number, order_event, test_object, TestWorld};
use lodestream::{
    CancellationToken, CatchUpCopier, MigrationStatus, StorageBackend, StreamId, CLOSURE_EVENT_TYPE,
};
use std::sync::Arc;

#[test]
fn migration_with_concurrent_arrivals_loses_and_duplicates_nothing() {
    crate::common::init_tracing();
    let world = TestWorld::new();
    let object = test_object();
    let router = world.router(&object);

    // E1..E10
    for n in 1..=10u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let source = world.document(&object).active_stream.stream_id.clone();
    let target = StreamId::new("order-42-target");

    // The copier has worked through the first ten when...
    let copier = CatchUpCopier::new(
        Arc::clone(&world.backend) as Arc<dyn StorageBackend>,
        source.clone(),
        target.clone(),
    );
    let mut progress = copier.seed_progress(None).unwrap();
    assert_eq!(copier.copy_once(&mut progress).unwrap(), 10);

    // ...E11 and E12 land on the source behind its back
    router.append(vec![order_event(11)]).unwrap();
    router.append(vec![order_event(12)]).unwrap();
    assert!(!copier.is_converged(&progress).unwrap());

    // The orchestrator picks up from the half-copied state and finishes
    let report = world
        .orchestrator()
        .migrate(&object, &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(report.events_copied, 2);
    assert_eq!(report.source_final_version, 13);
    assert_eq!(report.target_final_version, 12);

    // Source: 12 business events then exactly one closure event at v12
    let source_events = world.events(&source);
    assert_eq!(source_events.len(), 13);
    let closure = &source_events[12];
    assert_eq!(closure.event.event_type, CLOSURE_EVENT_TYPE);
    assert_eq!(closure.event.continuation(), Some(target.clone()));
    assert_eq!(
        source_events[..12]
            .iter()
            .filter(|r| r.event.is_closure())
            .count(),
        0
    );

    // Target: E1..E12 in source order, versions 0..=11
    let target_events = world.events(&target);
    assert_eq!(target_events.len(), 12);
    for (i, recorded) in target_events.iter().enumerate() {
        assert_eq!(recorded.version, i as u64);
        assert_eq!(event_number(&recorded.event), i as u32 + 1);
    }

    // Routing flipped, with the source recorded as terminated
    let doc = world.document(&object);
    assert!(doc.is_active(&target));
    assert_eq!(doc.continuation_of(&source), Some(&target));
    let terminated = &doc.terminated_streams[0];
    assert_eq!(terminated.termination_version, 13);

    // E13 is transparently redirected onto the target
    let outcome = router.append(vec![order_event(13)]).unwrap();
    assert_eq!(outcome.stream_id, target);
    assert_eq!(outcome.version, 13);
    let target_events = world.events(&target);
    assert_eq!(target_events[12].version, 12);
    assert_eq!(event_number(&target_events[12].event), 13);

    // Full logical sequence: no gap, no duplicate
    let numbers: Vec<u32> = target_events.iter().map(|r| event_number(&r.event)).collect();
    assert_eq!(numbers, (1..=13).collect::<Vec<u32>>());
}

#[test]
fn migration_of_quiet_stream_completes_and_redirects() {
    let world = TestWorld::new();
    let object = test_object();
    let router = world.router(&object);
    for n in 0..5u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let source = world.document(&object).active_stream.stream_id.clone();
    let target = StreamId::new("order-42-target");

    let report = world
        .orchestrator()
        .migrate(&object, &target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(report.events_copied, 5);
    assert_eq!(report.catch_up_attempts, 1);
    assert_eq!(report.source_final_version, 6);
    assert_eq!(report.target_final_version, 5);

    assert!(world.document(&object).is_active(&target));
    let outcome = router.append(vec![order_event(5)]).unwrap();
    assert_eq!(outcome.stream_id, target);
    assert_eq!(outcome.version, 6);
}

#[test]
fn migrated_entity_can_migrate_again() {
    let world = TestWorld::new();
    let object = test_object();
    let router = world.router(&object);
    for n in 0..3u32 {
        router.append(vec![order_event(n)]).unwrap();
    }
    let first_target = StreamId::new("order-42-gen2");
    world
        .orchestrator()
        .migrate(&object, &first_target, &CancellationToken::new())
        .unwrap();
    router.append(vec![order_event(3)]).unwrap();

    let second_target = StreamId::new("order-42-gen3");
    let report = world
        .orchestrator()
        .migrate(&object, &second_target, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(report.events_copied, 4);

    let doc = world.document(&object);
    assert!(doc.is_active(&second_target));
    assert_eq!(doc.terminated_streams.len(), 2);

    // The whole history survived both hops
    let numbers: Vec<u32> = world
        .events(&second_target)
        .iter()
        .map(|r| event_number(&r.event))
        .collect();
    assert_eq!(numbers, vec![0, 1, 2, 3]);
}
