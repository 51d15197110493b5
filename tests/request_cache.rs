//! Request cache lifecycle over a file-backed store.

use std::time::Duration;

use sif::{cache::SharedRequestCache, config::RequestCacheConfig, SifError};

#[test]
fn test_entries_survive_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sif").join("requests.log");
    let shared = SharedRequestCache::file_backed(&path, Some(Duration::from_secs(3600)));

    let cache = shared.get().unwrap();
    cache
        .store_request_info("M1", "StudentPersonal", Some(serde_json::json!({"page": 2})), "District")
        .unwrap();
    cache.store_request_info("M2", "SchoolInfo", None, "District").unwrap();
    cache.store_request_info("M1", "LibraryPatronStatus", None, "State").unwrap();
    assert_eq!(cache.active_request_count(), 3);

    let consumed = cache.get_request_info("M2", "District").unwrap();
    assert_eq!(consumed.object_type, "SchoolInfo");
    assert_eq!(cache.active_request_count(), 2);

    shared.close();
    assert!(!shared.is_initialized());

    let reopened = shared.get().unwrap();
    assert_eq!(reopened.active_request_count(), 2);
    // Reopening compacted away the consumed record.
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    assert!(reopened.get_request_info("M2", "District").is_none());

    let district = reopened.lookup_request_info("M1", "District").unwrap();
    assert_eq!(district.object_type, "StudentPersonal");
    assert_eq!(district.user_state, Some(serde_json::json!({"page": 2})));
    assert!(district.active);

    let state = reopened.get_request_info("M1", "State").unwrap();
    assert_eq!(state.object_type, "LibraryPatronStatus");
    assert_eq!(reopened.active_request_count(), 1);
}

#[test]
fn test_backend_failure_is_lifecycle_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let config = RequestCacheConfig {
        path: Some(blocker.join("requests.log")),
        ttl_secs: None,
    };
    let shared = config.build();
    assert!(matches!(shared.get(), Err(SifError::Lifecycle(_))));
    assert!(!shared.is_initialized());
}
