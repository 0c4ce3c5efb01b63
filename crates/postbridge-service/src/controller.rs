//! Operator actions: status, migrate, verify, set-phase, cleanup and seed.
//!
//! Each action runs once per invocation against backends opened by the caller.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use postbridge_core::{
    table_name_for, Backends, ColumnStore, CoreError, CoreResult, DocumentStore,
    MigrationPhase,
};

use crate::config::AppConfig;
use crate::migrator::{BulkMigrator, MigrationOptions, MigrationReport};
use crate::phase_state::{PhaseChange, PhaseState};
use crate::post_service::PostService;
use crate::seed::{seed_posts, SeedReport};
use crate::state::StateStore;
use crate::verifier::{VerificationReport, VerificationSummary, Verifier, VerifyOptions};

/// Row counts of one collection on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub collection: String,
    /// `None` when the count could not be read.
    pub mongodb: Option<u64>,
    pub cassandra: Option<u64>,
}

/// One row of the phase table shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRow {
    pub phase: MigrationPhase,
    pub description: &'static str,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub phase: MigrationPhase,
    pub mongodb_connected: bool,
    pub cassandra_connected: bool,
    pub collections: Vec<CollectionCounts>,
    pub last_verification: Option<VerificationSummary>,
    pub phases: Vec<PhaseRow>,
}

/// Result of `migrate`, with the follow-up count check when it ran.
#[derive(Debug, Clone)]
pub struct MigrateOutcome {
    pub report: MigrationReport,
    pub verification: Option<VerificationReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Collections to clear; empty means the posts collection.
    pub collections: Vec<String>,
    /// Count only.
    pub dry_run: bool,
    /// Drop the collections after deleting their documents.
    pub drop_collection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionCleanup {
    pub collection: String,
    /// Documents deleted, or found when dry-running.
    pub documents: u64,
    pub dropped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub collections: Vec<CollectionCleanup>,
}

impl CleanupReport {
    #[must_use]
    pub fn total_documents(&self) -> u64 {
        self.collections.iter().map(|c| c.documents).sum()
    }
}

/// Drives the migration from the operator's side.
pub struct MigrationController {
    phase: PhaseState,
    backends: Backends,
    state: StateStore,
    posts_collection: String,
    defaults: MigrationOptions,
}

impl MigrationController {
    pub fn new(
        phase: PhaseState,
        backends: Backends,
        state: StateStore,
        posts_collection: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            backends,
            state,
            posts_collection: posts_collection.into(),
            defaults: MigrationOptions::default(),
        }
    }

    /// Builds a controller whose phase is persisted in `config_path`.
    pub fn from_config(
        config: &AppConfig,
        config_path: impl Into<PathBuf>,
        backends: Backends,
    ) -> Self {
        let phase = PhaseState::new(config_path, config.migration_phase);
        let mut controller = Self::new(
            phase,
            backends,
            StateStore::new(config.migration.state_dir.clone()),
            &config.mongo.posts_collection,
        );
        controller.defaults = MigrationOptions {
            collections: config.migration.collections.clone(),
            batch_size: config.migration.batch_size,
            max_in_flight: config.migration.max_in_flight,
            dry_run: false,
        };
        controller
    }

    /// Migration options from configuration, for callers to adjust.
    #[must_use]
    pub fn migration_defaults(&self) -> MigrationOptions {
        self.defaults.clone()
    }

    #[must_use]
    pub fn current_phase(&self) -> MigrationPhase {
        self.phase.current_phase()
    }

    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Collects phase, connectivity, counts and the last verification.
    ///
    /// Backend failures show up as disconnected or missing counts; only a
    /// broken state directory fails the call.
    pub async fn status(&self) -> CoreResult<ControllerStatus> {
        let phase = self.current_phase();
        let documents = self.reachable_documents().await;
        let columns = self.reachable_columns().await;

        let mut names = Vec::new();
        if let Some(store) = &documents {
            match store.list_collections().await {
                Ok(found) => names.extend(found.into_iter().filter(|n| !n.starts_with("system."))),
                Err(err) => tracing::debug!(error = %err, "could not list collections"),
            }
        }
        if !names.contains(&self.posts_collection) {
            names.push(self.posts_collection.clone());
        }
        names.sort();

        let mut collections = Vec::with_capacity(names.len());
        for collection in names {
            let mongodb = match &documents {
                Some(store) => store.count(&collection).await.ok(),
                None => None,
            };
            let cassandra = match (&columns, table_name_for(&collection)) {
                (Some(store), Ok(table)) => store.count(&table).await.ok(),
                _ => None,
            };
            collections.push(CollectionCounts {
                collection,
                mongodb,
                cassandra,
            });
        }

        let phases = MigrationPhase::ALL
            .iter()
            .map(|p| PhaseRow {
                phase: *p,
                description: p.description(),
                current: *p == phase,
            })
            .collect();

        Ok(ControllerStatus {
            phase,
            mongodb_connected: documents.is_some(),
            cassandra_connected: columns.is_some(),
            collections,
            last_verification: self.state.load_verification().await?,
            phases,
        })
    }

    async fn reachable_documents(&self) -> Option<Arc<dyn DocumentStore>> {
        let store = self.backends.documents.clone()?;
        match store.ping().await {
            Ok(()) => Some(store),
            Err(err) => {
                tracing::debug!(error = %err, "MongoDB ping failed");
                None
            }
        }
    }

    async fn reachable_columns(&self) -> Option<Arc<dyn ColumnStore>> {
        let store = self.backends.columns.clone()?;
        match store.ping().await {
            Ok(()) => Some(store),
            Err(err) => {
                tracing::debug!(error = %err, "Cassandra ping failed");
                None
            }
        }
    }

    /// Copies collections into Cassandra, then checks counts unless this is
    /// a dry run or `skip_verification` is set.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when either store is missing or unreachable at
    /// the start; `Validation` for bad options.
    pub async fn migrate(
        &self,
        options: &MigrationOptions,
        skip_verification: bool,
    ) -> CoreResult<MigrateOutcome> {
        let (documents, columns) = self.connected_pair().await?;
        let migrator = BulkMigrator::new(documents, columns);
        let report = migrator.migrate(options).await?;

        let verification = if options.dry_run || skip_verification {
            None
        } else {
            let verify = VerifyOptions {
                collections: report.collection_names(),
                ..VerifyOptions::default()
            };
            Some(self.verify(&verify).await?)
        };

        Ok(MigrateOutcome {
            report,
            verification,
        })
    }

    /// Compares source and target and persists the summary for `status`.
    pub async fn verify(&self, options: &VerifyOptions) -> CoreResult<VerificationReport> {
        let (documents, columns) = self.connected_pair().await?;
        let report = Verifier::new(documents, columns).verify(options).await?;
        self.state.save_verification(&report.summary()).await?;
        Ok(report)
    }

    async fn connected_pair(&self) -> CoreResult<(Arc<dyn DocumentStore>, Arc<dyn ColumnStore>)> {
        let documents = self.backends.documents()?.clone();
        let columns = self.backends.columns()?.clone();
        documents.ping().await?;
        columns.ping().await?;
        Ok((documents, columns))
    }

    /// Validates and persists a new phase. Running processes keep their
    /// phase until restarted.
    pub fn set_phase(&self, raw: &str) -> CoreResult<PhaseChange> {
        self.phase.set_phase(raw)
    }

    /// Removes migrated data from MongoDB.
    ///
    /// # Errors
    ///
    /// `UnsafeCleanup` unless the phase is `cassandra_only`, checked before
    /// anything is touched; backend errors from MongoDB.
    pub async fn cleanup(&self, options: &CleanupOptions) -> CoreResult<CleanupReport> {
        let phase = self.current_phase();
        if phase != MigrationPhase::CassandraOnly {
            return Err(CoreError::UnsafeCleanup { phase });
        }

        let documents = self.backends.documents()?;
        let targets = if options.collections.is_empty() {
            vec![self.posts_collection.clone()]
        } else {
            options.collections.clone()
        };

        let mut collections = Vec::with_capacity(targets.len());
        for collection in targets {
            let entry = if options.dry_run {
                let found = documents.count(&collection).await?;
                tracing::info!(collection = %collection, documents = found, "dry run: would delete");
                CollectionCleanup {
                    collection,
                    documents: found,
                    dropped: false,
                }
            } else {
                let deleted = documents.delete_all(&collection).await?;
                if options.drop_collection {
                    documents.drop_collection(&collection).await?;
                }
                tracing::warn!(
                    collection = %collection,
                    deleted,
                    dropped = options.drop_collection,
                    "MongoDB data removed"
                );
                CollectionCleanup {
                    collection,
                    documents: deleted,
                    dropped: options.drop_collection,
                }
            };
            collections.push(entry);
        }

        Ok(CleanupReport {
            dry_run: options.dry_run,
            collections,
        })
    }

    /// Inserts the sample posts through the data layer of the current phase.
    pub async fn seed(&self, reset: bool) -> CoreResult<SeedReport> {
        let service = PostService::new(
            self.current_phase(),
            self.backends.clone(),
            &self.posts_collection,
        )?;
        service.prepare().await?;
        seed_posts(&service, reset).await
    }
}

#[cfg(test)]
mod tests {
    use postbridge_core::Backend;
    use postbridge_storage::memory::{MemoryColumnStore, MemoryDocumentStore};
    use serde_json::json;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        documents: MemoryDocumentStore,
        columns: MemoryColumnStore,
        controller: MigrationController,
    }

    fn fixture(phase: MigrationPhase) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let documents = MemoryDocumentStore::new();
        let columns = MemoryColumnStore::new();
        let backends = Backends::new(Arc::new(documents.clone()), Arc::new(columns.clone()));
        let state = PhaseState::new(dir.path().join("postbridge.toml"), phase).with_env_override(None);
        let controller =
            MigrationController::new(state, backends, StateStore::new(dir.path().join("state")), "posts");
        Fixture {
            _dir: dir,
            documents,
            columns,
            controller,
        }
    }

    async fn insert(store: &MemoryDocumentStore, collection: &str, title: &str) {
        let doc = json!({"title": title, "content": "c", "author": "a", "Date": "2024-01-01T00:00:00.000Z"});
        store
            .insert(collection, doc.as_object().unwrap().clone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_refused_before_cassandra_only() {
        for phase in [
            MigrationPhase::MongoOnly,
            MigrationPhase::DualWrite,
            MigrationPhase::ReadCassandra,
        ] {
            let f = fixture(phase);
            insert(&f.documents, "posts", "a").await;
            let err = f.controller.cleanup(&CleanupOptions::default()).await.unwrap_err();
            assert!(matches!(err, CoreError::UnsafeCleanup { phase: p } if p == phase));
            assert_eq!(f.documents.count("posts").await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_cleanup_dry_run_then_delete() {
        let f = fixture(MigrationPhase::CassandraOnly);
        insert(&f.documents, "posts", "a").await;
        insert(&f.documents, "posts", "b").await;

        let dry = f
            .controller
            .cleanup(&CleanupOptions {
                dry_run: true,
                ..CleanupOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(dry.total_documents(), 2);
        assert_eq!(f.documents.count("posts").await.unwrap(), 2);

        let done = f
            .controller
            .cleanup(&CleanupOptions {
                drop_collection: true,
                ..CleanupOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(done.total_documents(), 2);
        assert!(done.collections[0].dropped);
        assert!(f.documents.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_runs_count_check_and_persists_summary() {
        let f = fixture(MigrationPhase::MongoOnly);
        insert(&f.documents, "posts", "a").await;
        insert(&f.documents, "posts", "b").await;

        let outcome = f
            .controller
            .migrate(&f.controller.migration_defaults(), false)
            .await
            .unwrap();
        assert_eq!(outcome.report.total_written(), 2);
        let verification = outcome.verification.unwrap();
        assert!(verification.is_consistent());

        let status = f.controller.status().await.unwrap();
        let summary = status.last_verification.unwrap();
        assert!(summary.consistent);
        assert_eq!(summary.collections, vec!["posts"]);
        assert_eq!(
            status.collections,
            vec![CollectionCounts {
                collection: "posts".into(),
                mongodb: Some(2),
                cassandra: Some(2),
            }]
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_verification_and_writes() {
        let f = fixture(MigrationPhase::MongoOnly);
        insert(&f.documents, "posts", "a").await;

        let options = MigrationOptions {
            dry_run: true,
            ..f.controller.migration_defaults()
        };
        let outcome = f.controller.migrate(&options, false).await.unwrap();
        assert!(outcome.verification.is_none());
        assert!(!f.columns.has_table("posts"));
        assert!(f.controller.state().load_verification().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migrate_requires_reachable_backends() {
        let f = fixture(MigrationPhase::MongoOnly);
        f.columns.faults().set_offline(true);
        let err = f
            .controller
            .migrate(&MigrationOptions::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::BackendUnavailable {
                backend: Backend::Cassandra,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_status_marks_current_phase_and_offline_backend() {
        let f = fixture(MigrationPhase::DualWrite);
        f.documents.faults().set_offline(true);

        let status = f.controller.status().await.unwrap();
        assert!(!status.mongodb_connected);
        assert!(status.cassandra_connected);
        let current: Vec<_> = status.phases.iter().filter(|r| r.current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].phase, MigrationPhase::DualWrite);
        assert_eq!(status.collections[0].mongodb, None);
    }

    #[tokio::test]
    async fn test_seed_uses_current_phase() {
        let f = fixture(MigrationPhase::DualWrite);
        let report = f.controller.seed(false).await.unwrap();
        assert_eq!(report.inserted.len(), 6);
        assert_eq!(f.documents.count("posts").await.unwrap(), 6);
        assert_eq!(f.columns.count("posts").await.unwrap(), 6);
    }
}
