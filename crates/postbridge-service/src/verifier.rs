//! Read-only comparison of MongoDB collections with their Cassandra tables.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use postbridge_core::{
    blob_digest, table_name_for, BlobRow, ColumnStore, CoreResult, DocumentStore,
};

use crate::metrics::VERIFICATION_MISMATCHES_TOTAL;
use crate::migrator::BulkMigrator;

/// Digest reported for a target blob that is not a JSON object.
pub const INVALID_BLOB_DIGEST: &str = "<invalid json>";

/// How much content to compare beyond counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCheck {
    /// Compare counts only.
    #[default]
    CountsOnly,
    /// Point-read the first `n` source ids (sorted) from the target.
    Sample(usize),
    /// Scan both sides completely.
    Full,
}

impl fmt::Display for ContentCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountsOnly => f.write_str("counts"),
            Self::Sample(n) => write!(f, "sample({n})"),
            Self::Full => f.write_str("full"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Collections to check; empty means every non-system collection.
    pub collections: Vec<String>,
    pub content: ContentCheck,
}

/// A difference between source and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    Count { source: u64, target: u64 },
    MissingInTarget { id: String },
    UnexpectedInTarget { id: String },
    ContentDiffers {
        id: String,
        source_digest: String,
        target_digest: String,
    },
}

impl Mismatch {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::MissingInTarget { .. } => "missing_in_target",
            Self::UnexpectedInTarget { .. } => "unexpected_in_target",
            Self::ContentDiffers { .. } => "content_differs",
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count { source, target } => {
                write!(f, "count differs: {source} in MongoDB, {target} in Cassandra")
            }
            Self::MissingInTarget { id } => write!(f, "`{id}` missing in Cassandra"),
            Self::UnexpectedInTarget { id } => write!(f, "`{id}` only exists in Cassandra"),
            Self::ContentDiffers {
                id,
                source_digest,
                target_digest,
            } => write!(
                f,
                "`{id}` content differs ({} vs {})",
                short(source_digest),
                short(target_digest)
            ),
        }
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Findings for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionVerification {
    pub collection: String,
    pub source_count: Option<u64>,
    pub target_count: Option<u64>,
    /// Documents whose content was compared
    pub checked: u64,
    pub mismatches: Vec<Mismatch>,
    /// Error that stopped this collection's check
    pub error: Option<String>,
}

impl CollectionVerification {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            source_count: None,
            target_count: None,
            checked: 0,
            mismatches: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.error.is_none() && self.mismatches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified_at: DateTime<Utc>,
    pub content: ContentCheck,
    pub collections: Vec<CollectionVerification>,
}

impl VerificationReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.collections.iter().all(CollectionVerification::is_consistent)
    }

    #[must_use]
    pub fn total_mismatches(&self) -> usize {
        self.collections.iter().map(|c| c.mismatches.len()).sum()
    }

    /// Condensed form persisted for `status`.
    #[must_use]
    pub fn summary(&self) -> VerificationSummary {
        VerificationSummary {
            verified_at: self.verified_at,
            content: self.content.to_string(),
            collections: self.collections.iter().map(|c| c.collection.clone()).collect(),
            total_mismatches: self.total_mismatches(),
            errors: self.collections.iter().filter(|c| c.error.is_some()).count(),
            consistent: self.is_consistent(),
        }
    }
}

/// Condensed verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub verified_at: DateTime<Utc>,
    pub content: String,
    pub collections: Vec<String>,
    pub total_mismatches: usize,
    #[serde(default)]
    pub errors: usize,
    pub consistent: bool,
}

/// Compares source collections with target tables. Never writes.
pub struct Verifier {
    documents: Arc<dyn DocumentStore>,
    columns: Arc<dyn ColumnStore>,
}

impl Verifier {
    pub fn new(documents: Arc<dyn DocumentStore>, columns: Arc<dyn ColumnStore>) -> Self {
        Self { documents, columns }
    }

    /// Checks the selected collections.
    ///
    /// # Errors
    ///
    /// Fails only when no collections were named and MongoDB cannot list them;
    /// per-collection failures are recorded in the report.
    pub async fn verify(&self, options: &VerifyOptions) -> CoreResult<VerificationReport> {
        let collections = BulkMigrator::new(self.documents.clone(), self.columns.clone())
            .resolve_collections(&options.collections)
            .await?;

        let mut results = Vec::with_capacity(collections.len());
        for collection in &collections {
            let mut result = CollectionVerification::new(collection);
            if let Err(err) = self.verify_collection(collection, options.content, &mut result).await {
                tracing::error!(collection = %collection, error = %err, "verification failed");
                result.error = Some(err.to_string());
            }
            for mismatch in &result.mismatches {
                VERIFICATION_MISMATCHES_TOTAL
                    .with_label_values(&[collection.as_str(), mismatch.kind()])
                    .inc();
            }
            tracing::info!(
                collection = %collection,
                source = ?result.source_count,
                target = ?result.target_count,
                checked = result.checked,
                mismatches = result.mismatches.len(),
                "collection verified"
            );
            results.push(result);
        }

        Ok(VerificationReport {
            verified_at: Utc::now(),
            content: options.content,
            collections: results,
        })
    }

    async fn verify_collection(
        &self,
        collection: &str,
        content: ContentCheck,
        result: &mut CollectionVerification,
    ) -> CoreResult<()> {
        let table = table_name_for(collection)?;

        let source = self.documents.count(collection).await?;
        let target = self.columns.count(&table).await?;
        result.source_count = Some(source);
        result.target_count = Some(target);
        if source != target {
            result.mismatches.push(Mismatch::Count { source, target });
        }

        match content {
            ContentCheck::CountsOnly => Ok(()),
            ContentCheck::Sample(n) => self.compare_sample(collection, &table, n, result).await,
            ContentCheck::Full => self.compare_full(collection, &table, result).await,
        }
    }

    /// Source rows keyed by id, as the migrator would write them.
    async fn source_digests(&self, collection: &str) -> CoreResult<BTreeMap<String, String>> {
        let mut digests = BTreeMap::new();
        let mut documents = self.documents.find_stream(collection).await?;
        while let Some(document) = documents.next().await {
            let document = document?;
            match BlobRow::from_document(&document) {
                Ok(row) => {
                    let digest = blob_digest(&row.data)?;
                    digests.insert(row.id, digest);
                }
                Err(err) => {
                    tracing::warn!(collection, error = %err, "source document has no usable id; not compared");
                }
            }
        }
        Ok(digests)
    }

    async fn compare_sample(
        &self,
        collection: &str,
        table: &str,
        n: usize,
        result: &mut CollectionVerification,
    ) -> CoreResult<()> {
        let source = self.source_digests(collection).await?;
        for (id, source_digest) in source.into_iter().take(n) {
            let target = self.columns.get(table, &id).await?;
            result.checked += 1;
            if let Some(mismatch) = compare(id, source_digest, target.as_ref()) {
                result.mismatches.push(mismatch);
            }
        }
        Ok(())
    }

    async fn compare_full(
        &self,
        collection: &str,
        table: &str,
        result: &mut CollectionVerification,
    ) -> CoreResult<()> {
        let source = self.source_digests(collection).await?;
        let mut target: BTreeMap<String, BlobRow> = self
            .columns
            .scan(table)
            .await?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        for (id, source_digest) in source {
            let row = target.remove(&id);
            result.checked += 1;
            if let Some(mismatch) = compare(id, source_digest, row.as_ref()) {
                result.mismatches.push(mismatch);
            }
        }
        result
            .mismatches
            .extend(target.into_keys().map(|id| Mismatch::UnexpectedInTarget { id }));
        Ok(())
    }
}

fn compare(id: String, source_digest: String, target: Option<&BlobRow>) -> Option<Mismatch> {
    let Some(row) = target else {
        return Some(Mismatch::MissingInTarget { id });
    };
    let target_digest =
        blob_digest(&row.data).unwrap_or_else(|_| INVALID_BLOB_DIGEST.to_string());
    (target_digest != source_digest).then_some(Mismatch::ContentDiffers {
        id,
        source_digest,
        target_digest,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use postbridge_core::Document;
    use postbridge_storage::memory::{MemoryColumnStore, MemoryDocumentStore};

    use super::*;
    use crate::migrator::MigrationOptions;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn migrated(n: usize) -> (MemoryDocumentStore, MemoryColumnStore, Verifier) {
        let documents = MemoryDocumentStore::new();
        for i in 0..n {
            documents
                .insert("posts", doc(json!({"_id": format!("p{i}"), "title": format!("t{i}"), "tags": ["a", "b"]})))
                .await
                .unwrap();
        }
        let columns = MemoryColumnStore::new();
        BulkMigrator::new(Arc::new(documents.clone()), Arc::new(columns.clone()))
            .migrate(&MigrationOptions::default())
            .await
            .unwrap();
        let verifier = Verifier::new(Arc::new(documents.clone()), Arc::new(columns.clone()));
        (documents, columns, verifier)
    }

    fn full() -> VerifyOptions {
        VerifyOptions {
            collections: vec!["posts".into()],
            content: ContentCheck::Full,
        }
    }

    #[tokio::test]
    async fn test_consistent_after_migration() {
        let (_, _, verifier) = migrated(5).await;
        let report = verifier.verify(&full()).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.collections[0].checked, 5);
        let summary = report.summary();
        assert!(summary.consistent);
        assert_eq!(summary.total_mismatches, 0);
    }

    #[tokio::test]
    async fn test_detects_missing_and_count() {
        let (documents, _, verifier) = migrated(2).await;
        documents
            .insert("posts", doc(json!({"_id": "late", "title": "x"})))
            .await
            .unwrap();

        let report = verifier.verify(&full()).await.unwrap();
        let mismatches = &report.collections[0].mismatches;
        assert!(mismatches.contains(&Mismatch::Count { source: 3, target: 2 }));
        assert!(mismatches.contains(&Mismatch::MissingInTarget { id: "late".into() }));
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn test_detects_content_drift_and_invalid_blobs() {
        let (_, columns, verifier) = migrated(3).await;
        columns.corrupt("posts", "p0", r#"{"_id":"p0","title":"edited","tags":["a","b"]}"#);
        columns.corrupt("posts", "p1", "not json");

        let report = verifier.verify(&full()).await.unwrap();
        let mismatches = &report.collections[0].mismatches;
        assert_eq!(mismatches.len(), 2);
        assert!(mismatches.iter().all(|m| m.kind() == "content_differs"));
        assert!(mismatches.iter().any(|m| matches!(
            m,
            Mismatch::ContentDiffers { id, target_digest, .. } if id == "p1" && target_digest == INVALID_BLOB_DIGEST
        )));
    }

    #[tokio::test]
    async fn test_key_order_does_not_matter() {
        let (_, columns, verifier) = migrated(1).await;
        columns.corrupt("posts", "p0", r#"{"tags":["a","b"],"title":"t0","_id":"p0"}"#);
        assert!(verifier.verify(&full()).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_unexpected_rows_only_reported_by_full_scan() {
        let (_, columns, verifier) = migrated(2).await;
        columns.corrupt("posts", "ghost", r#"{"_id":"ghost"}"#);

        let full_report = verifier.verify(&full()).await.unwrap();
        assert!(full_report.collections[0]
            .mismatches
            .contains(&Mismatch::UnexpectedInTarget { id: "ghost".into() }));

        let sample = verifier
            .verify(&VerifyOptions {
                collections: vec!["posts".into()],
                content: ContentCheck::Sample(10),
            })
            .await
            .unwrap();
        assert_eq!(
            sample.collections[0].mismatches,
            vec![Mismatch::Count { source: 2, target: 3 }]
        );
        assert_eq!(sample.collections[0].checked, 2);
    }

    #[tokio::test]
    async fn test_sample_checks_first_ids_in_order() {
        let (documents, _, verifier) = migrated(3).await;
        documents
            .insert("posts", doc(json!({"_id": "a_first", "title": "x"})))
            .await
            .unwrap();

        let report = verifier
            .verify(&VerifyOptions {
                collections: vec!["posts".into()],
                content: ContentCheck::Sample(1),
            })
            .await
            .unwrap();
        let result = &report.collections[0];
        assert_eq!(result.checked, 1);
        assert!(result
            .mismatches
            .contains(&Mismatch::MissingInTarget { id: "a_first".into() }));
    }

    #[tokio::test]
    async fn test_never_writes() {
        let documents = MemoryDocumentStore::new();
        documents
            .insert("posts", doc(json!({"_id": "x"})))
            .await
            .unwrap();
        let columns = MemoryColumnStore::new();
        let verifier = Verifier::new(Arc::new(documents), Arc::new(columns.clone()));

        let report = verifier.verify(&full()).await.unwrap();
        assert_eq!(report.collections[0].target_count, Some(0));
        assert!(!columns.has_table("posts"));
        assert_eq!(columns.faults().calls_matching("upsert"), 0);
        assert_eq!(columns.faults().calls_matching("ensure_table"), 0);
    }

    #[tokio::test]
    async fn test_connectivity_failure_is_per_collection() {
        let (documents, columns, verifier) = migrated(1).await;
        documents
            .insert("comments", doc(json!({"_id": "c"})))
            .await
            .unwrap();
        columns.faults().set_offline(true);

        let report = verifier.verify(&VerifyOptions::default()).await.unwrap();
        assert_eq!(report.collections.len(), 2);
        assert!(report.collections.iter().all(|c| c.error.is_some()));
        assert_eq!(report.summary().errors, 2);
        assert!(!report.summary().consistent);
    }
}
