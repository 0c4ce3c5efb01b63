//! End-to-end migration workflows against the in-memory stores.
//!
//! Each test walks the phases the way an operator would: write in one phase,
//! restart the data layer in the next, migrate, verify and clean up.

use std::sync::Arc;

use postbridge_core::{
    Backends, ColumnStore, CoreError, DocumentStore, MigrationPhase, NewPost, SortOrder,
};
use postbridge_service::{
    CleanupOptions, ContentCheck, MigrationController, MigrationOptions, Mismatch, PhaseState,
    PostService, StateStore, VerifyOptions,
};
use postbridge_storage::memory::{MemoryColumnStore, MemoryDocumentStore, MockFailure};

struct Harness {
    dir: tempfile::TempDir,
    documents: MemoryDocumentStore,
    columns: MemoryColumnStore,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            documents: MemoryDocumentStore::new(),
            columns: MemoryColumnStore::new(),
        }
    }

    fn backends(&self) -> Backends {
        Backends::new(
            Arc::new(self.documents.clone()),
            Arc::new(self.columns.clone()),
        )
    }

    /// A data layer as it would be built after a restart in `phase`.
    async fn service(&self, phase: MigrationPhase) -> PostService {
        let service = PostService::new(phase, self.backends(), "posts").unwrap();
        service.prepare().await.unwrap();
        service
    }

    fn controller(&self, phase: MigrationPhase) -> MigrationController {
        let state = PhaseState::new(self.dir.path().join("postbridge.toml"), phase)
            .with_env_override(None);
        MigrationController::new(
            state,
            self.backends(),
            StateStore::new(self.dir.path().join("state")),
            "posts",
        )
    }
}

fn full_check() -> VerifyOptions {
    VerifyOptions {
        collections: vec!["posts".into()],
        content: ContentCheck::Full,
    }
}

#[tokio::test]
async fn test_created_post_is_listed_once_in_every_phase() {
    for phase in MigrationPhase::ALL {
        let harness = Harness::new();
        let service = harness.service(phase).await;

        let post = service
            .create_post(NewPost::new(Some("Ada"), "Hello", "World"))
            .await
            .unwrap();

        let listed = service.list_posts(SortOrder::Date).await.unwrap();
        let hits = listed.iter().filter(|p| p.id == post.id).count();
        assert_eq!(hits, 1, "phase {phase}");
    }
}

#[tokio::test]
async fn test_post_written_before_dual_write_is_missing_until_migrated() {
    let harness = Harness::new();

    let mongo_only = harness.service(MigrationPhase::MongoOnly).await;
    let a = mongo_only
        .create_post(NewPost::new(None, "A", "first"))
        .await
        .unwrap();

    let dual = harness.service(MigrationPhase::DualWrite).await;
    let b = dual
        .create_post(NewPost::new(None, "B", "second"))
        .await
        .unwrap();

    let controller = harness.controller(MigrationPhase::DualWrite);
    let report = controller.verify(&full_check()).await.unwrap();
    let mismatches = &report.collections[0].mismatches;

    assert!(mismatches.contains(&Mismatch::MissingInTarget {
        id: a.id.to_string()
    }));
    assert!(!mismatches.iter().any(|m| matches!(
        m,
        Mismatch::MissingInTarget { id } | Mismatch::ContentDiffers { id, .. } if *id == b.id.to_string()
    )));

    // A bulk copy closes the gap.
    let outcome = controller
        .migrate(&MigrationOptions::default(), false)
        .await
        .unwrap();
    assert!(outcome.verification.unwrap().is_consistent());
    assert!(controller.verify(&full_check()).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_failed_secondary_write_is_reported_by_verify() {
    let harness = Harness::new();
    let dual = harness.service(MigrationPhase::DualWrite).await;

    harness
        .columns
        .faults()
        .push_failures([MockFailure::Unavailable("write timeout")]);
    let b = dual
        .create_post(NewPost::new(None, "B", "second"))
        .await
        .unwrap();

    assert_eq!(harness.documents.count("posts").await.unwrap(), 1);
    assert_eq!(harness.columns.count("posts").await.unwrap(), 0);

    let report = harness
        .controller(MigrationPhase::DualWrite)
        .verify(&full_check())
        .await
        .unwrap();
    assert!(report.collections[0]
        .mismatches
        .contains(&Mismatch::MissingInTarget {
            id: b.id.to_string()
        }));
    assert!(!report.is_consistent());
}

#[tokio::test]
async fn test_migrating_twice_matches_migrating_once() {
    let harness = Harness::new();
    let service = harness.service(MigrationPhase::MongoOnly).await;
    for i in 0..7 {
        service
            .create_post(NewPost::new(None, &format!("post {i}"), "body"))
            .await
            .unwrap();
    }

    let controller = harness.controller(MigrationPhase::MongoOnly);
    let options = MigrationOptions {
        batch_size: 3,
        max_in_flight: 2,
        ..MigrationOptions::default()
    };

    controller.migrate(&options, true).await.unwrap();
    let once = harness.columns.scan("posts").await.unwrap();

    controller.migrate(&options, true).await.unwrap();
    let twice = harness.columns.scan("posts").await.unwrap();

    assert_eq!(once.len(), 7);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_dry_run_leaves_verification_unchanged() {
    let harness = Harness::new();
    let service = harness.service(MigrationPhase::MongoOnly).await;
    service
        .create_post(NewPost::new(None, "t", "c"))
        .await
        .unwrap();

    let controller = harness.controller(MigrationPhase::MongoOnly);
    let before = controller.verify(&full_check()).await.unwrap();

    let options = MigrationOptions {
        dry_run: true,
        ..MigrationOptions::default()
    };
    let outcome = controller.migrate(&options, false).await.unwrap();
    assert_eq!(outcome.report.total_written(), 1);
    assert!(outcome.verification.is_none());

    let after = controller.verify(&full_check()).await.unwrap();
    assert_eq!(before.collections[0].mismatches, after.collections[0].mismatches);
    assert_eq!(harness.columns.count("posts").await.unwrap(), 0);
}

#[tokio::test]
async fn test_full_cutover_then_cleanup() {
    let harness = Harness::new();
    let service = harness.service(MigrationPhase::MongoOnly).await;
    for title in ["B", "A", "C"] {
        service
            .create_post(NewPost::new(None, title, "body"))
            .await
            .unwrap();
    }

    let controller = harness.controller(MigrationPhase::MongoOnly);
    controller
        .migrate(&MigrationOptions::default(), false)
        .await
        .unwrap();

    for next in ["dual_write", "read_cassandra", "cassandra_only"] {
        let change = controller.set_phase(next).unwrap();
        assert_eq!(change.current.as_str(), next);
    }
    assert_eq!(controller.current_phase(), MigrationPhase::CassandraOnly);

    let persisted = PhaseState::load(harness.dir.path().join("postbridge.toml")).unwrap();
    assert_eq!(persisted.current_phase(), MigrationPhase::CassandraOnly);

    // After a restart in the final phase, reads come from Cassandra.
    let cassandra_only = harness.service(MigrationPhase::CassandraOnly).await;
    let titles: Vec<String> = cassandra_only
        .list_posts(SortOrder::Title)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["A", "B", "C"]);

    let restarted = harness.controller(MigrationPhase::CassandraOnly);
    let report = restarted.cleanup(&CleanupOptions::default()).await.unwrap();
    assert_eq!(report.total_documents(), 3);
    assert_eq!(harness.documents.count("posts").await.unwrap(), 0);
    assert_eq!(cassandra_only.list_posts(SortOrder::Date).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_cleanup_guard_keeps_mongo_data() {
    let harness = Harness::new();
    let service = harness.service(MigrationPhase::ReadCassandra).await;
    service
        .create_post(NewPost::new(None, "t", "c"))
        .await
        .unwrap();

    let err = harness
        .controller(MigrationPhase::ReadCassandra)
        .cleanup(&CleanupOptions {
            drop_collection: true,
            ..CleanupOptions::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::UnsafeCleanup { .. }));
    assert_eq!(harness.documents.count("posts").await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_phase_leaves_state_unchanged() {
    let harness = Harness::new();
    let controller = harness.controller(MigrationPhase::MongoOnly);
    controller.set_phase("dual_write").unwrap();

    let err = controller.set_phase("read_everything").unwrap_err();
    assert!(matches!(err, CoreError::InvalidPhase { .. }));
    assert_eq!(controller.current_phase(), MigrationPhase::DualWrite);

    let persisted = PhaseState::load(harness.dir.path().join("postbridge.toml")).unwrap();
    assert_eq!(persisted.current_phase(), MigrationPhase::DualWrite);
}
