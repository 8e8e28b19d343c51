//! Process-level behaviour: config files feeding a running engine, and the
//! JSON the admin surface serves.

use std::io::Write;
use std::sync::Arc;

use axum::extract::State;
use tallymark::api::handlers::{health_check, system_info};
use tallymark::api::AppState;
use tallymark::engine::{open_engine, Payload, StorageType};
use tallymark::Config;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn config_file_drives_the_engine() {
    let data = tempfile::tempdir().unwrap();
    let file = write_config(&format!(
        r#"
        [storage]
        storage_type = "lmdb"
        data_dir = "{}"
        map_size = 16777216

        [engine.routing]
        total_queues = 4
        queues_per_consumer = 2

        [engine.limits]
        max_field_length = 8
        "#,
        data.path().join("db").display()
    ));

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.storage.storage_type, StorageType::Lmdb);

    let engine = open_engine(&config.storage, config.engine.clone()).unwrap();
    assert_eq!(engine.add("ns", "b", "short").payload, Payload::Count(1));
    assert!(!engine.add("ns", "b", "far-too-long").success);
    assert_eq!(engine.stats().consumers, 2);
    engine.shutdown().unwrap();
}

#[test]
fn unreadable_config_is_reported() {
    let file = write_config("[storage\nstorage_type = ");
    assert!(matches!(Config::from_file(file.path()), Err(tallymark::Error::Config(_))));
    assert!(Config::from_file("/nonexistent/tallymark.toml").is_err());
}

#[test]
fn admin_bodies_serialize_engine_state() {
    let mut config = Config::default();
    config.storage.storage_type = StorageType::Memory;
    let engine = Arc::new(open_engine(&config.storage, config.engine.clone()).unwrap());
    engine.add("ns", "b", "e");
    engine.add("ns", "b", "e");

    let state = AppState::new(Arc::clone(&engine));
    let (_, health) = tokio_test::block_on(health_check(State(state.clone())));
    let health = serde_json::to_value(&health.0).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["stats"]["adds"], 2);
    assert_eq!(health["stats"]["running"], true);

    let info = tokio_test::block_on(system_info(State(state)));
    let info = serde_json::to_value(&info.0).unwrap();
    assert_eq!(info["storage_type"], "memory");
    assert_eq!(info["total_queues"], 16);
    assert_eq!(info["version"], tallymark::VERSION);

    engine.shutdown().unwrap();
}
