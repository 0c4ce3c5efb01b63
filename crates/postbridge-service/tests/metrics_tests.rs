//! Integration tests for the Prometheus metrics recorded by the data layer.
//!
//! Counters are process-global, so assertions compare before/after values.

use std::sync::Arc;

use postbridge_core::{Backends, MigrationPhase, NewPost, SortOrder};
use postbridge_service::metrics::{
    export_prometheus, DUAL_WRITE_FAILURES_TOTAL, POSTS_CREATED_TOTAL,
};
use postbridge_service::PostService;
use postbridge_storage::memory::{MemoryColumnStore, MemoryDocumentStore, MockFailure};

#[tokio::test]
async fn test_dual_write_failure_is_counted() {
    let columns = MemoryColumnStore::new();
    let backends = Backends::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(columns.clone()),
    );
    let service = PostService::new(MigrationPhase::DualWrite, backends, "posts").unwrap();
    service.prepare().await.unwrap();

    let failures = DUAL_WRITE_FAILURES_TOTAL.with_label_values(&["cassandra"]);
    let mongo_ok = POSTS_CREATED_TOTAL.with_label_values(&["mongodb", "success"]);
    let (failures_before, mongo_before) = (failures.get(), mongo_ok.get());

    columns
        .faults()
        .push_failures([MockFailure::Unavailable("no hosts")]);
    service
        .create_post(NewPost::new(None, "t", "c"))
        .await
        .unwrap();

    assert!(failures.get() >= failures_before + 1.0);
    assert!(mongo_ok.get() >= mongo_before + 1.0);
}

#[tokio::test]
async fn test_export_contains_recorded_families() {
    let backends = Backends::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(MemoryColumnStore::new()),
    );
    let service = PostService::new(MigrationPhase::MongoOnly, backends, "posts").unwrap();
    service
        .create_post(NewPost::new(None, "t", "c"))
        .await
        .unwrap();
    service.list_posts(SortOrder::Date).await.unwrap();

    let output = export_prometheus();
    assert!(output.contains("# TYPE postbridge_posts_created_total counter"));
    assert!(output.contains("postbridge_read_duration_seconds_bucket"));
}
