//! Migration-aware data layer for blog posts.
//!
//! Every operation dispatches on the phase fixed at construction: reads go to
//! [`MigrationPhase::read_backend`], writes follow [`MigrationPhase::write_plan`].

use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use postbridge_core::document::ID_FIELD;
use postbridge_core::{
    aggregate_author_stats, sort_posts, table_name_for, AuthorStat, Backend, Backends, BlobRow,
    CoreError, CoreResult, Document, MigrationPhase, NewPost, Post, PostId, SortOrder,
};

use crate::metrics::{DUAL_WRITE_FAILURES_TOTAL, POSTS_CREATED_TOTAL, READ_DURATION_SECONDS};

/// Connectivity and post counts per backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub phase: MigrationPhase,
    pub mongodb_connected: bool,
    pub cassandra_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongodb_post_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cassandra_post_count: Option<u64>,
}

/// Blog post operations routed by migration phase.
///
/// Holds no mutable state; share it behind an `Arc`.
pub struct PostService {
    phase: MigrationPhase,
    backends: Backends,
    collection: String,
    table: String,
}

impl PostService {
    /// Creates the data layer for `phase`.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the phase's read or primary write backend is
    /// missing from `backends`; `Validation` when the collection is not a
    /// valid table name. A missing secondary is allowed: its writes fail and
    /// are counted like any other secondary failure.
    pub fn new(
        phase: MigrationPhase,
        backends: Backends,
        posts_collection: impl Into<String>,
    ) -> CoreResult<Self> {
        let mut required = vec![phase.read_backend()];
        let primary = phase.write_plan().primary;
        if !required.contains(&primary) {
            required.push(primary);
        }
        for backend in required {
            if !backends.has(backend) {
                return Err(CoreError::unavailable(
                    backend,
                    format!("required by phase `{phase}` but not configured"),
                ));
            }
        }
        if let Some(secondary) = phase.write_plan().secondary {
            if !backends.has(secondary) {
                tracing::warn!(
                    phase = %phase,
                    backend = %secondary,
                    "secondary backend not configured; mirrored writes will be skipped"
                );
            }
        }
        let collection = posts_collection.into();
        let table = table_name_for(&collection)?;

        tracing::info!(phase = %phase, collection = %collection, "post service ready");
        Ok(Self {
            phase,
            backends,
            collection,
            table,
        })
    }

    /// Creates the Cassandra table when the phase uses Cassandra.
    ///
    /// A failure is only fatal when Cassandra is the read or primary backend;
    /// as a pure secondary it is logged and left to the per-write handling.
    pub async fn prepare(&self) -> CoreResult<()> {
        if !self.phase.requires(Backend::Cassandra) {
            return Ok(());
        }
        let result = match self.backends.columns() {
            Ok(columns) => columns.ensure_table(&self.table).await,
            Err(err) => Err(err),
        };
        match result {
            Err(err) if !self.cassandra_is_authoritative() => {
                tracing::warn!(
                    table = %self.table,
                    error = %err,
                    "could not prepare secondary table; dual writes will fail until it exists"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn cassandra_is_authoritative(&self) -> bool {
        self.phase.read_backend() == Backend::Cassandra
            || self.phase.write_plan().primary == Backend::Cassandra
    }

    #[must_use]
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// Mongo collection (and Cassandra table source name) holding posts.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Stores a new post according to the phase's write plan.
    ///
    /// The primary write decides success. A failed secondary write is logged,
    /// counted in `postbridge_dual_write_failures_total` and otherwise ignored;
    /// `verify` reports the resulting drift.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty title or content; any primary backend error.
    pub async fn create_post(&self, new_post: NewPost) -> CoreResult<Post> {
        self.create_post_at(new_post, Utc::now()).await
    }

    /// Same as [`create_post`](Self::create_post) with an explicit creation
    /// time, truncated to milliseconds. Used to load backdated sample data.
    pub async fn create_post_at(
        &self,
        new_post: NewPost,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Post> {
        if new_post.title.is_empty() || new_post.content.is_empty() {
            return Err(CoreError::Validation(
                "title and content are required".into(),
            ));
        }

        let mut post = Post {
            id: PostId::from(String::new()),
            author: new_post.resolved_author(),
            title: new_post.title,
            content: new_post.content,
            created_at: created_at.trunc_subsecs(3),
        };

        let plan = self.phase.write_plan();
        let primary = match plan.primary {
            Backend::Mongo => self.insert_into_mongo(&mut post).await,
            Backend::Cassandra => {
                post.id = PostId::generate();
                self.upsert_into_cassandra(&post).await
            }
        };
        record_write(plan.primary, &primary);
        primary?;

        if let Some(secondary) = plan.secondary {
            let mirrored = match secondary {
                Backend::Cassandra => self.upsert_into_cassandra(&post).await,
                Backend::Mongo => self.insert_into_mongo(&mut post.clone()).await,
            };
            record_write(secondary, &mirrored);
            if let Err(err) = mirrored {
                DUAL_WRITE_FAILURES_TOTAL
                    .with_label_values(&[secondary.as_str()])
                    .inc();
                tracing::warn!(
                    phase = %self.phase,
                    backend = %secondary,
                    id = %post.id,
                    error = %err,
                    "secondary write failed; post exists only in the primary store"
                );
            }
        }

        tracing::debug!(id = %post.id, author = %post.author, "post created");
        Ok(post)
    }

    async fn insert_into_mongo(&self, post: &mut Post) -> CoreResult<()> {
        let mut document = post.to_document();
        if post.id.as_str().is_empty() {
            document.remove(ID_FIELD);
        }
        let id = self
            .backends
            .documents()?
            .insert(&self.collection, document)
            .await?;
        post.id = PostId::from(id);
        Ok(())
    }

    async fn upsert_into_cassandra(&self, post: &Post) -> CoreResult<()> {
        let row = BlobRow::from_document(&post.to_document())?;
        self.backends.columns()?.upsert(&self.table, row).await
    }

    /// Lists all posts from the phase's read backend.
    ///
    /// Stored documents that do not decode as posts are skipped with a warning.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the read backend cannot be reached.
    pub async fn list_posts(&self, order: SortOrder) -> CoreResult<Vec<Post>> {
        let mut posts = self.read_posts("list_posts").await?;
        sort_posts(&mut posts, order);
        Ok(posts)
    }

    /// Post counts per author from the phase's read backend, most prolific first.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the read backend cannot be reached.
    pub async fn author_stats(&self) -> CoreResult<Vec<AuthorStat>> {
        let posts = self.read_posts("author_stats").await?;
        Ok(aggregate_author_stats(&posts))
    }

    async fn read_posts(&self, operation: &str) -> CoreResult<Vec<Post>> {
        let backend = self.phase.read_backend();
        let started = Instant::now();
        let documents = self.read_documents(backend).await?;
        READ_DURATION_SECONDS
            .with_label_values(&[backend.as_str(), operation])
            .observe(started.elapsed().as_secs_f64());

        let posts = documents
            .iter()
            .filter_map(|document| match Post::from_document(document) {
                Ok(post) => Some(post),
                Err(err) => {
                    tracing::warn!(backend = %backend, error = %err, "skipping undecodable post");
                    None
                }
            })
            .collect();
        Ok(posts)
    }

    async fn read_documents(&self, backend: Backend) -> CoreResult<Vec<Document>> {
        match backend {
            Backend::Mongo => self.backends.documents()?.find_all(&self.collection).await,
            Backend::Cassandra => {
                let rows = self.backends.columns()?.scan(&self.table).await?;
                Ok(rows
                    .into_iter()
                    .filter_map(|row| match row.to_document() {
                        Ok(document) => Some(document),
                        Err(err) => {
                            tracing::warn!(id = %row.id, error = %err, "skipping malformed row");
                            None
                        }
                    })
                    .collect())
            }
        }
    }

    /// Reports the phase, backend connectivity and post counts.
    ///
    /// Never fails: unreachable backends are reported as disconnected.
    pub async fn status(&self) -> ServiceStatus {
        let (mongodb_connected, mongodb_post_count) = match &self.backends.documents {
            Some(store) => match store.ping().await {
                Ok(()) => (true, store.count(&self.collection).await.ok()),
                Err(err) => {
                    tracing::debug!(error = %err, "MongoDB ping failed");
                    (false, None)
                }
            },
            None => (false, None),
        };

        let (cassandra_connected, cassandra_post_count) = match &self.backends.columns {
            Some(store) => match store.ping().await {
                Ok(()) => (true, store.count(&self.table).await.ok()),
                Err(err) => {
                    tracing::debug!(error = %err, "Cassandra ping failed");
                    (false, None)
                }
            },
            None => (false, None),
        };

        ServiceStatus {
            phase: self.phase,
            mongodb_connected,
            cassandra_connected,
            mongodb_post_count,
            cassandra_post_count,
        }
    }
}

fn record_write(backend: Backend, result: &CoreResult<()>) {
    let outcome = if result.is_ok() { "success" } else { "error" };
    POSTS_CREATED_TOTAL
        .with_label_values(&[backend.as_str(), outcome])
        .inc();
}
