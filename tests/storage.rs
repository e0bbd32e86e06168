//! Persistence through the service, and store error handling.

use event_stream::{
    EventError, EventService, EventStore, FileStore, FileStoreConfig, Record, SearchQuery,
    ServiceConfig, StorageConfig, StoreError,
};
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        storage: StorageConfig::File(FileStoreConfig {
            path: dir.path().join("store"),
            sync_interval: 1,
            create_if_missing: true,
        }),
        ..Default::default()
    }
}

#[test]
fn test_records_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let service = EventService::new(file_config(&dir)).unwrap();
        service
            .ingest(
                Record::new("1", "click", 1000)
                    .with_origin("web")
                    .with_root_id("session-1")
                    .with_metadata("browser", "firefox")
                    .with_data(b"{\"x\":1}".to_vec()),
            )
            .unwrap();
        service.ingest(Record::new("2", "view", 1001)).unwrap();
        service.delete("2").unwrap();
    }

    let service = EventService::new(file_config(&dir)).unwrap();
    let record = service.read("1").unwrap();
    assert_eq!(record.origin, "web");
    assert_eq!(record.root_id, "session-1");
    assert_eq!(record.metadata.get("browser").map(String::as_str), Some("firefox"));
    assert_eq!(record.data, b"{\"x\":1}");

    assert!(matches!(
        service.read("2"),
        Err(EventError::Upstream(StoreError::RecordNotFound(_)))
    ));
}

#[test]
fn test_second_service_on_same_store_is_locked() {
    let dir = TempDir::new().unwrap();
    let _first = EventService::new(file_config(&dir)).unwrap();

    let second = EventService::new(file_config(&dir));
    assert!(matches!(
        second,
        Err(EventError::Upstream(StoreError::Locked))
    ));
}

#[test]
fn test_search_by_root_and_range() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open_or_create(FileStoreConfig {
        path: dir.path().join("store"),
        ..Default::default()
    })
    .unwrap();

    for i in 1..=30i64 {
        let root = if i % 2 == 0 { "even" } else { "odd" };
        store
            .create(&Record::new(format!("{:02}", i), "tick", i * 10).with_root_id(root))
            .unwrap();
    }

    let hits = store
        .search(&SearchQuery {
            root_id: "even".into(),
            from: 50,
            to: 200,
            limit: 100,
            ..Default::default()
        })
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["06", "08", "10", "12", "14", "16", "18", "20"]);

    let page = store
        .search(&SearchQuery {
            root_id: "even".into(),
            from: 50,
            to: 200,
            limit: 3,
            offset: 2,
            reverse: true,
            ..Default::default()
        })
        .unwrap();
    let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["16", "14", "12"]);
}

#[test]
fn test_update_unknown_id_is_noop() {
    let dir = TempDir::new().unwrap();
    let service = EventService::new(file_config(&dir)).unwrap();

    service.update(&Record::new("ghost", "click", 1)).unwrap();
    assert!(service.read("ghost").unwrap_err().is_upstream());
}

#[test]
fn test_corrupt_manifest_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");
    {
        let _store = FileStore::open_or_create(FileStoreConfig {
            path: path.clone(),
            ..Default::default()
        })
        .unwrap();
    }

    std::fs::write(path.join("MANIFEST"), b"JUNK").unwrap();

    let result = FileStore::open_or_create(FileStoreConfig {
        path,
        ..Default::default()
    });
    assert!(matches!(result, Err(StoreError::InvalidFormat(_))));
}
