//! Storage seams: the document store, the wide-column store and the handle
//! set a process holds for them.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::document::{BlobRow, Document};
use crate::error::{CoreError, CoreResult};
use crate::phase::Backend;

/// Documents of one collection, yielded as the store reads them.
pub type DocumentStream = BoxStream<'static, CoreResult<Document>>;

/// Document-oriented store (MongoDB or an in-memory stand-in).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Checks connectivity.
    async fn ping(&self) -> CoreResult<()>;

    /// Lists collection names, `system.*` included if the server reports them.
    async fn list_collections(&self) -> CoreResult<Vec<String>>;

    /// Inserts a document and returns its id.
    ///
    /// When the document has no `_id`, the store assigns one and returns it.
    async fn insert(&self, collection: &str, document: Document) -> CoreResult<String>;

    /// Returns every document of a collection with `_id` flattened to a string.
    async fn find_all(&self, collection: &str) -> CoreResult<Vec<Document>>;

    /// Streams every document of a collection, `_id` flattened as in
    /// [`find_all`](Self::find_all).
    ///
    /// The default implementation reads the whole collection first; stores
    /// with server-side cursors should override it.
    async fn find_stream(&self, collection: &str) -> CoreResult<DocumentStream> {
        let documents = self.find_all(collection).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    /// Returns the number of documents in a collection.
    async fn count(&self, collection: &str) -> CoreResult<u64>;

    /// Deletes every document of a collection and returns how many were removed.
    async fn delete_all(&self, collection: &str) -> CoreResult<u64>;

    /// Drops a collection. Dropping a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> CoreResult<()>;
}

/// Wide-column store holding documents as `(id text PRIMARY KEY, data text)` rows.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Checks connectivity.
    async fn ping(&self) -> CoreResult<()>;

    /// Creates the table if it does not exist.
    async fn ensure_table(&self, table: &str) -> CoreResult<()>;

    /// Inserts or replaces a row.
    async fn upsert(&self, table: &str, row: BlobRow) -> CoreResult<()>;

    /// Inserts or replaces a batch of rows.
    ///
    /// The default implementation upserts one row at a time; stores that
    /// support batches should override it.
    async fn upsert_batch(&self, table: &str, rows: Vec<BlobRow>) -> CoreResult<()> {
        for row in rows {
            self.upsert(table, row).await?;
        }
        Ok(())
    }

    /// Point read by row key.
    async fn get(&self, table: &str, id: &str) -> CoreResult<Option<BlobRow>>;

    /// Returns every row of the table. A missing table reads as empty.
    async fn scan(&self, table: &str) -> CoreResult<Vec<BlobRow>>;

    /// Returns the number of rows. A missing table counts as zero.
    async fn count(&self, table: &str) -> CoreResult<u64>;
}

/// Backend handles available to a process.
///
/// Either side may be absent when the phase does not need it.
#[derive(Clone, Default)]
pub struct Backends {
    /// MongoDB, or `None` when it was not configured or could not be reached
    /// at startup.
    pub documents: Option<Arc<dyn DocumentStore>>,
    /// Cassandra, with the same meaning of `None`.
    pub columns: Option<Arc<dyn ColumnStore>>,
}

impl Backends {
    /// Creates a handle set with both backends.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, columns: Arc<dyn ColumnStore>) -> Self {
        Self {
            documents: Some(documents),
            columns: Some(columns),
        }
    }

    /// Returns true if a handle for `backend` is present.
    #[must_use]
    pub fn has(&self, backend: Backend) -> bool {
        match backend {
            Backend::Mongo => self.documents.is_some(),
            Backend::Cassandra => self.columns.is_some(),
        }
    }

    /// Returns the document store or `BackendUnavailable`.
    ///
    /// # Errors
    ///
    /// Fails when MongoDB was not configured for this process.
    pub fn documents(&self) -> CoreResult<&Arc<dyn DocumentStore>> {
        self.documents
            .as_ref()
            .ok_or_else(|| CoreError::unavailable(Backend::Mongo, "not configured"))
    }

    /// Returns the column store or `BackendUnavailable`.
    ///
    /// # Errors
    ///
    /// Fails when Cassandra was not configured for this process.
    pub fn columns(&self) -> CoreResult<&Arc<dyn ColumnStore>> {
        self.columns
            .as_ref()
            .ok_or_else(|| CoreError::unavailable(Backend::Cassandra, "not configured"))
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("documents", &self.documents.is_some())
            .field("columns", &self.columns.is_some())
            .finish()
    }
}
