//! Bulk copy of MongoDB collections into Cassandra blob tables.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use postbridge_core::{
    document_id, table_name_for, BlobRow, ColumnStore, CoreError, CoreResult, DocumentStore,
};

use crate::config::{BATCH_SIZE_RANGE, MAX_IN_FLIGHT_RANGE};
use crate::metrics::{MIGRATION_BATCH_DURATION_SECONDS, MIGRATION_DOCUMENTS_TOTAL};

/// Placeholder id for documents whose `_id` cannot be read.
pub const UNKNOWN_ID: &str = "<unknown>";

/// Parameters of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Collections to copy; empty means every non-system collection.
    pub collections: Vec<String>,
    /// Rows per Cassandra batch
    pub batch_size: usize,
    /// Batches written concurrently
    pub max_in_flight: usize,
    /// Read and transform only; no writes, no DDL.
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            batch_size: 50,
            max_in_flight: 4,
            dry_run: false,
        }
    }
}

impl MigrationOptions {
    /// Validate configuration
    pub fn validate(&self) -> CoreResult<()> {
        if !BATCH_SIZE_RANGE.contains(&self.batch_size) {
            return Err(CoreError::Validation(format!(
                "batch_size must be between {} and {}, got {}",
                BATCH_SIZE_RANGE.start(),
                BATCH_SIZE_RANGE.end(),
                self.batch_size
            )));
        }
        if !MAX_IN_FLIGHT_RANGE.contains(&self.max_in_flight) {
            return Err(CoreError::Validation(format!(
                "max_in_flight must be between {} and {}, got {}",
                MAX_IN_FLIGHT_RANGE.start(),
                MAX_IN_FLIGHT_RANGE.end(),
                self.max_in_flight
            )));
        }
        Ok(())
    }
}

/// A document that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentError {
    pub id: String,
    pub message: String,
}

/// Outcome for a single collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub collection: String,
    /// Documents read from MongoDB
    pub read: u64,
    /// Rows written (or, in a dry run, rows that would have been written)
    pub written: u64,
    pub errors: Vec<DocumentError>,
    /// Error that aborted this collection's pass
    pub fatal: Option<String>,
    pub elapsed: Duration,
}

impl CollectionReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            read: 0,
            written: 0,
            errors: Vec::new(),
            fatal: None,
            elapsed: Duration::ZERO,
        }
    }

    /// True when every document was written and nothing aborted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.fatal.is_none() && self.errors.is_empty()
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub collections: Vec<CollectionReport>,
    pub elapsed: Duration,
}

impl MigrationReport {
    /// True if any collection's pass was aborted.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.collections.iter().any(|c| c.fatal.is_some())
    }

    #[must_use]
    pub fn total_read(&self) -> u64 {
        self.collections.iter().map(|c| c.read).sum()
    }

    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.collections.iter().map(|c| c.written).sum()
    }

    #[must_use]
    pub fn total_errors(&self) -> usize {
        self.collections.iter().map(|c| c.errors.len()).sum()
    }

    /// Names of the collections that were processed.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|c| c.collection.clone()).collect()
    }
}

/// Result of writing one batch.
struct BatchOutcome {
    written: u64,
    errors: Vec<DocumentError>,
}

/// Copies documents from a [`DocumentStore`] into a [`ColumnStore`].
pub struct BulkMigrator {
    documents: Arc<dyn DocumentStore>,
    columns: Arc<dyn ColumnStore>,
}

impl BulkMigrator {
    pub fn new(documents: Arc<dyn DocumentStore>, columns: Arc<dyn ColumnStore>) -> Self {
        Self { documents, columns }
    }

    /// Resolves the collections to process: the given names, or every
    /// collection MongoDB reports except `system.*`.
    ///
    /// # Errors
    ///
    /// Fails when the collection listing is needed and MongoDB cannot provide
    /// it, and with `Validation` when two collections map to the same table.
    pub async fn resolve_collections(&self, requested: &[String]) -> CoreResult<Vec<String>> {
        let names = if requested.is_empty() {
            let mut names: Vec<String> = self
                .documents
                .list_collections()
                .await?
                .into_iter()
                .filter(|name| !name.starts_with("system."))
                .collect();
            names.sort();
            names
        } else {
            let mut names: Vec<String> = Vec::with_capacity(requested.len());
            for name in requested {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            names
        };
        ensure_distinct_tables(&names)?;
        Ok(names)
    }

    /// Copies the selected collections.
    ///
    /// Per-document failures are collected in the report. A connectivity
    /// failure aborts only the collection being processed.
    ///
    /// # Errors
    ///
    /// `Validation` for out-of-range options; listing failures when no
    /// collections were named.
    pub async fn migrate(&self, options: &MigrationOptions) -> CoreResult<MigrationReport> {
        options.validate()?;
        let started = Instant::now();
        let collections = self.resolve_collections(&options.collections).await?;

        tracing::info!(
            collections = collections.len(),
            batch_size = options.batch_size,
            max_in_flight = options.max_in_flight,
            dry_run = options.dry_run,
            "starting migration"
        );

        let mut reports = Vec::with_capacity(collections.len());
        for collection in &collections {
            let collection_started = Instant::now();
            let mut report = CollectionReport::new(collection);
            if let Err(err) = self.migrate_collection(collection, options, &mut report).await {
                tracing::error!(collection = %collection, error = %err, "collection pass aborted");
                report.fatal = Some(err.to_string());
            }
            report.elapsed = collection_started.elapsed();

            tracing::info!(
                collection = %collection,
                read = report.read,
                written = report.written,
                errors = report.errors.len(),
                fatal = report.fatal.is_some(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "collection migrated"
            );
            reports.push(report);
        }

        Ok(MigrationReport {
            dry_run: options.dry_run,
            collections: reports,
            elapsed: started.elapsed(),
        })
    }

    async fn migrate_collection(
        &self,
        collection: &str,
        options: &MigrationOptions,
        report: &mut CollectionReport,
    ) -> CoreResult<()> {
        let table = table_name_for(collection)?;
        let mut documents = self.documents.find_stream(collection).await?;

        let mut pass = CollectionPass {
            migrator: self,
            collection,
            table,
            dry_run: options.dry_run,
            semaphore: Arc::new(Semaphore::new(options.max_in_flight)),
            join_set: JoinSet::new(),
            table_ready: false,
            fatal: None,
        };
        let mut chunk = Vec::with_capacity(options.batch_size);

        while let Some(next) = documents.next().await {
            let document = match next {
                Ok(document) => document,
                Err(err) => {
                    pass.record_fatal(err);
                    break;
                }
            };
            report.read += 1;
            match BlobRow::from_document(&document) {
                Ok(row) => chunk.push(row),
                Err(err) => {
                    let id = document_id(&document).unwrap_or_else(|| UNKNOWN_ID.to_string());
                    record_document_error(collection, &mut report.errors, id, err.to_string());
                }
            }
            if chunk.len() == options.batch_size {
                let full = std::mem::replace(&mut chunk, Vec::with_capacity(options.batch_size));
                pass.dispatch(full, report).await;
            }
            if pass.fatal.is_some() {
                break;
            }
        }
        if pass.fatal.is_none() && !chunk.is_empty() {
            pass.dispatch(chunk, report).await;
        }

        pass.finish(report).await
    }
}

/// Write state of one collection while its documents stream in.
///
/// At most `max_in_flight` batches exist at once: a permit is taken before a
/// batch task is spawned and released when the task ends.
struct CollectionPass<'a> {
    migrator: &'a BulkMigrator,
    collection: &'a str,
    table: String,
    dry_run: bool,
    semaphore: Arc<Semaphore>,
    join_set: JoinSet<CoreResult<BatchOutcome>>,
    table_ready: bool,
    fatal: Option<CoreError>,
}

impl CollectionPass<'_> {
    async fn dispatch(&mut self, rows: Vec<BlobRow>, report: &mut CollectionReport) {
        let collection = self.collection;
        if self.dry_run {
            for row in &rows {
                tracing::debug!(collection, table = %self.table, id = %row.id, bytes = row.data.len(), "would write row");
            }
            report.written += rows.len() as u64;
            MIGRATION_DOCUMENTS_TOTAL
                .with_label_values(&[collection, "dry_run"])
                .inc_by(rows.len() as f64);
            return;
        }

        if !self.table_ready {
            if let Err(err) = self.migrator.columns.ensure_table(&self.table).await {
                self.record_fatal(err);
                return;
            }
            self.table_ready = true;
        }

        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.record_fatal(CoreError::internal(format!("batch semaphore closed: {e}")));
                return;
            }
        };
        // Results of batches that already finished.
        while let Some(joined) = self.join_set.try_join_next() {
            self.absorb(joined, report);
        }
        if self.fatal.is_some() {
            return;
        }

        let columns = self.migrator.columns.clone();
        let collection = collection.to_string();
        let table = self.table.clone();
        self.join_set.spawn(async move {
            let _permit = permit;
            write_batch(columns.as_ref(), &collection, &table, rows).await
        });
    }

    fn absorb(
        &mut self,
        joined: Result<CoreResult<BatchOutcome>, tokio::task::JoinError>,
        report: &mut CollectionReport,
    ) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) if join_err.is_cancelled() => return,
            Err(join_err) => Err(CoreError::internal(format!("batch task failed: {join_err}"))),
        };
        match outcome {
            Ok(batch) => {
                report.written += batch.written;
                report.errors.extend(batch.errors);
            }
            Err(err) => self.record_fatal(err),
        }
    }

    fn record_fatal(&mut self, err: CoreError) {
        if self.fatal.is_none() {
            self.join_set.abort_all();
            self.fatal = Some(err);
        }
    }

    async fn finish(mut self, report: &mut CollectionReport) -> CoreResult<()> {
        while let Some(joined) = self.join_set.join_next().await {
            self.absorb(joined, report);
        }
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Rejects collection sets in which two names share a Cassandra table.
///
/// Table names are case-folded, so `Posts` and `posts` would overwrite each
/// other's rows. Names that are not valid table names are left to fail on
/// their own.
fn ensure_distinct_tables(collections: &[String]) -> CoreResult<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for collection in collections {
        let Ok(table) = table_name_for(collection) else {
            continue;
        };
        if let Some(other) = seen.insert(table.clone(), collection) {
            return Err(CoreError::Validation(format!(
                "collections `{other}` and `{collection}` both map to table `{table}`"
            )));
        }
    }
    Ok(())
}

/// Writes one batch; on a non-connectivity failure retries row by row so
/// failures are attributed to individual ids.
async fn write_batch(
    columns: &dyn ColumnStore,
    collection: &str,
    table: &str,
    rows: Vec<BlobRow>,
) -> CoreResult<BatchOutcome> {
    let size = rows.len() as u64;
    let started = Instant::now();
    let result = columns.upsert_batch(table, rows.clone()).await;
    MIGRATION_BATCH_DURATION_SECONDS
        .with_label_values(&[collection])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            MIGRATION_DOCUMENTS_TOTAL
                .with_label_values(&[collection, "written"])
                .inc_by(size as f64);
            tracing::debug!(collection, rows = size, "batch written");
            Ok(BatchOutcome {
                written: size,
                errors: Vec::new(),
            })
        }
        Err(err) if err.is_unavailable() => Err(err),
        Err(err) => {
            tracing::warn!(collection, rows = size, error = %err, "batch rejected; retrying row by row");
            let mut outcome = BatchOutcome {
                written: 0,
                errors: Vec::new(),
            };
            for row in rows {
                let id = row.id.clone();
                match columns.upsert(table, row).await {
                    Ok(()) => {
                        outcome.written += 1;
                        MIGRATION_DOCUMENTS_TOTAL
                            .with_label_values(&[collection, "written"])
                            .inc();
                    }
                    Err(err) if err.is_unavailable() => return Err(err),
                    Err(err) => {
                        record_document_error(collection, &mut outcome.errors, id, err.to_string());
                    }
                }
            }
            Ok(outcome)
        }
    }
}

fn record_document_error(
    collection: &str,
    errors: &mut Vec<DocumentError>,
    id: String,
    message: String,
) {
    let err = CoreError::PartialMigration {
        collection: collection.to_string(),
        id: id.clone(),
        message: message.clone(),
    };
    tracing::warn!(error = %err, "document skipped");
    MIGRATION_DOCUMENTS_TOTAL
        .with_label_values(&[collection, "error"])
        .inc();
    errors.push(DocumentError { id, message });
}
