//! Open-constraint tests
//!
//! Constraint::New on an existing stream always fails; Constraint::Existing
//! on a missing stream always fails; Constraint::Loose always succeeds
//! regardless of prior existence.

use crate::common::{order_event, test_object, TestWorld};
use lodestream::{Error, EventStream, OpenConstraint, StreamConfig, StreamId};
use std::sync::Arc;

fn stream(world: &TestWorld, name: &str) -> EventStream {
    EventStream::new(
        Arc::clone(&world.backend) as Arc<dyn lodestream::StorageBackend>,
        Arc::clone(&world.documents) as Arc<dyn lodestream::DocumentStore>,
        test_object(),
        StreamId::new(name),
        StreamConfig::default(),
    )
}

#[test]
fn new_on_missing_stream_succeeds() {
    let world = TestWorld::new();
    let s = stream(&world, "s");
    let mut session = s.open_session(OpenConstraint::New).unwrap();
    session.append(order_event(0)).unwrap();
    assert_eq!(session.commit().unwrap(), 1);
}

#[test]
fn new_on_existing_stream_fails() {
    let world = TestWorld::new();
    let s = stream(&world, "s");
    let mut session = s.open_session(OpenConstraint::New).unwrap();
    session.append(order_event(0)).unwrap();
    session.commit().unwrap();

    let err = s.open_session(OpenConstraint::New).unwrap_err();
    assert!(matches!(err, Error::StreamAlreadyExists { .. }));
}

#[test]
fn existing_on_missing_stream_fails() {
    let world = TestWorld::new();
    let s = stream(&world, "s");
    let err = s.open_session(OpenConstraint::Existing).unwrap_err();
    assert!(matches!(err, Error::StreamNotFound { .. }));
}

#[test]
fn existing_on_existing_stream_succeeds() {
    let world = TestWorld::new();
    let s = stream(&world, "s");
    let mut session = s.open_session(OpenConstraint::New).unwrap();
    session.append(order_event(0)).unwrap();
    session.commit().unwrap();

    let mut session = s.open_session(OpenConstraint::Existing).unwrap();
    session.append(order_event(1)).unwrap();
    assert_eq!(session.commit().unwrap(), 2);
}

#[test]
fn loose_succeeds_regardless_of_existence() {
    let world = TestWorld::new();
    let s = stream(&world, "s");

    // Missing
    let mut session = s.open_session(OpenConstraint::Loose).unwrap();
    session.append(order_event(0)).unwrap();
    session.commit().unwrap();

    // Existing
    let mut session = s.open_session(OpenConstraint::Loose).unwrap();
    session.append(order_event(1)).unwrap();
    assert_eq!(session.commit().unwrap(), 2);
}
