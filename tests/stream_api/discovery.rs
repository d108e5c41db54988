//! Catch-up discovery tests
//!
//! External rebuild processes enumerate entities as a lazy, paginated
//! stream of work items.

use crate::common::{order_event, TestWorld};
use lodestream::{Discovery, ObjectIdentifier};
use std::sync::Arc;

#[test]
fn discovery_enumerates_every_entity_of_a_type() {
    let world = TestWorld::new();
    for id in 0..12u32 {
        let object = ObjectIdentifier::new("order", format!("{id:03}"));
        world.router(&object).append(vec![order_event(id)]).unwrap();
    }
    // Other types stay out of the listing
    world
        .router(&ObjectIdentifier::new("invoice", "001"))
        .append(vec![order_event(0)])
        .unwrap();

    let discovery = Discovery::new(Arc::clone(&world.documents) as Arc<dyn lodestream::DocumentStore>).with_page_size(5);
    let ids: Vec<String> = discovery
        .objects("order")
        .map(|r| r.unwrap().object_id)
        .collect();
    assert_eq!(ids.len(), 12);
    assert_eq!(ids.first().unwrap(), "000");
    assert_eq!(ids.last().unwrap(), "011");
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "listing order is stable and sorted");
}

#[test]
fn discovery_sees_migrated_entities_once() {
    let world = TestWorld::new();
    let object = ObjectIdentifier::new("order", "77");
    world.router(&object).append(vec![order_event(1)]).unwrap();

    let target = lodestream::StreamId::new("order-77-target");
    world
        .orchestrator()
        .migrate(&object, &target, &lodestream::CancellationToken::new())
        .unwrap();

    let discovery = Discovery::new(Arc::clone(&world.documents) as Arc<dyn lodestream::DocumentStore>);
    let ids: Vec<String> = discovery
        .objects("order")
        .map(|r| r.unwrap().object_id)
        .collect();
    assert_eq!(ids, vec!["77".to_string()]);
}
