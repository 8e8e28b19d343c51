use super::*;
use crate::storage::{MemStore, Table};
use crate::types::{Payload, ResponseKind};
use std::thread;

fn small_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.routing.total_queues = 4;
    config.routing.queues_per_consumer = 2;
    config.routing.queue_capacity = 16;
    config.maintenance.flush_interval_ms = 60_000;
    config
}

fn engine() -> (Arc<MemStore>, Engine<MemStore>) {
    let store = Arc::new(MemStore::new());
    let engine = Engine::open(small_config(), Arc::clone(&store)).unwrap();
    (store, engine)
}

#[test]
fn add_returns_counts_as_responses() {
    let (_, engine) = engine();
    for expected in 1..=3 {
        let response = engine.add("ns1", "b1", "e1");
        assert!(response.success);
        assert_eq!(response.kind, ResponseKind::Count);
        assert_eq!(response.payload, Payload::Count(expected));
    }

    let members = engine.members("ns1", "b1", 1);
    assert_eq!(members.payload, Payload::ListU32(vec![]));
    assert_eq!(engine.entities("ns1", "b1", 3).unwrap(), vec!["e1".to_string()]);
    assert_eq!(engine.counts("ns1", "b1").unwrap(), vec![3]);
    engine.shutdown().unwrap();
}

#[test]
fn missing_fields_are_rejected_without_mutation() {
    let (store, engine) = engine();
    for (ns, bm, id, field) in [("", "b", "e", "namespace"), ("ns", "", "e", "bitmap"), ("ns", "b", "", "entity_id")] {
        match engine.try_add(ns, bm, id) {
            Err(Error::Validation(ValidationError::Missing { field: f })) => assert_eq!(f, field),
            other => panic!("expected missing {field}, got {other:?}"),
        }
    }

    let response = engine.add("", "b", "e");
    assert!(!response.success);
    assert_eq!(response.kind, ResponseKind::Error);
    assert!(response.error_message.unwrap().contains("namespace"));

    engine.flush().unwrap();
    assert!(store.is_empty(Table::IdToInt));
    assert_eq!(engine.stats().adds_failed, 4);
}

#[test]
fn overlong_fields_are_rejected() {
    let (_, engine) = engine();
    let long = "x".repeat(129);
    let exact = "y".repeat(128);

    assert!(matches!(
        engine.try_add("ns", "b", &long),
        Err(Error::Validation(ValidationError::TooLong { field: "entity_id", len: 129, max: 128 }))
    ));
    assert!(matches!(engine.try_members(&long, "b", 1), Err(Error::Validation(_))));
    assert_eq!(engine.try_add("ns", "b", &exact).unwrap(), 1);
}

#[test]
fn validate_field_checks_bytes_not_chars() {
    assert!(validate_field("entity_id", "é", 2).is_ok());
    assert_eq!(
        validate_field("entity_id", "é", 1),
        Err(ValidationError::TooLong { field: "entity_id", len: 2, max: 1 })
    );
}

#[test]
fn count_of_unknown_entity_is_zero() {
    let (_, engine) = engine();
    assert_eq!(engine.count("ns", "b", "ghost").payload, Payload::Count(0));
    assert_eq!(engine.try_count("ns", "b", "ghost").unwrap(), 0);
    assert_eq!(engine.index().ids().cached(), 0);
}

#[test]
fn concurrent_callers_keep_exact_counts() {
    let (_, engine) = engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..25 {
                    for entity in ["shared-a", "shared-b"] {
                        engine.try_add("ns", "b", entity).unwrap();
                    }
                    engine.try_add("ns", "b", &format!("own-{t}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(engine.try_count("ns", "b", "shared-a").unwrap(), 100);
    assert_eq!(engine.try_count("ns", "b", "shared-b").unwrap(), 100);
    assert_eq!(engine.try_members("ns", "b", 1).unwrap().len(), 100);
    assert_eq!(engine.try_members("ns", "b", 100).unwrap().len(), 2);
    assert_eq!(engine.counts("ns", "b").unwrap(), vec![1, 100]);
    engine.shutdown().unwrap();
}

#[test]
fn shutdown_flushes_and_refuses_new_work() {
    let (store, engine) = engine();
    engine.try_add("ns", "b", "e1").unwrap();
    engine.try_add("ns", "b", "e1").unwrap();
    assert!(store.is_empty(Table::Bitmaps));

    engine.shutdown().unwrap();
    engine.shutdown().unwrap();

    assert_eq!(store.len(Table::Bitmaps), 1);
    assert_eq!(store.len(Table::EventCounters), 1);
    assert!(matches!(engine.try_add("ns", "b", "e1"), Err(Error::Shutdown)));
    assert!(matches!(engine.counts("ns", "b"), Err(Error::Shutdown)));
    assert!(!engine.stats().running);
}

#[test]
fn reopen_sees_flushed_state() {
    let store = Arc::new(MemStore::new());
    {
        let engine = Engine::open(small_config(), Arc::clone(&store)).unwrap();
        engine.try_add("ns", "b", "e1").unwrap();
        engine.try_add("ns", "b", "e2").unwrap();
        // Dropping the engine shuts it down.
    }

    let engine = Engine::open(small_config(), store).unwrap();
    assert_eq!(engine.try_add("ns", "b", "e1").unwrap(), 2);
    assert_eq!(engine.entities("ns", "b", 1).unwrap(), vec!["e2".to_string()]);
}

#[test]
fn invalid_topology_is_a_config_error() {
    let mut config = small_config();
    config.routing.total_queues = 6;
    config.routing.queues_per_consumer = 4;
    assert!(matches!(Engine::open(config, Arc::new(MemStore::new())), Err(Error::Config(_))));
}

#[test]
fn stats_reflect_activity() {
    let (_, engine) = engine();
    engine.try_add("ns", "b", "e1").unwrap();
    engine.try_add("ns", "b", "e1").unwrap();
    engine.try_members("ns", "b", 2).unwrap();

    let before = engine.stats();
    assert_eq!(before.adds, 2);
    assert_eq!(before.queries, 1);
    assert_eq!(before.consumers, 2);
    assert_eq!(before.total_queues, 4);
    assert_eq!(before.dirty_buckets, 2);
    assert_eq!(before.dirty_counters, 1);
    assert_eq!(before.epoch.pending, 3);

    assert_eq!(engine.flush().unwrap(), 3);
    let after = engine.stats();
    assert_eq!(after.dirty_buckets, 0);
    assert_eq!(after.maintenance.entries_written, 3);
    assert!(serde_json::to_string(&after).unwrap().contains("\"entries_written\":3"));
}

#[test]
fn concurrent_shutdowns_return_after_the_final_flush() {
    let (store, engine) = engine();
    let engine = Arc::new(engine);
    engine.try_add("ns", "b", "e1").unwrap();
    engine.try_add("ns", "b", "e2").unwrap();

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let store = Arc::clone(&store);
            thread::spawn(move || {
                engine.shutdown().unwrap();
                assert_eq!(store.len(Table::Bitmaps), 1);
                assert_eq!(store.len(Table::EventCounters), 2);
            })
        })
        .collect();
    for closer in closers {
        closer.join().unwrap();
    }
}
