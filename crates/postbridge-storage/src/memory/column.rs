use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use postbridge_core::{Backend, BlobRow, ColumnStore, CoreError, CoreResult};

use super::fault::FaultInjector;

/// In-memory Cassandra stand-in.
///
/// A batch is applied atomically: if any row key is rejected, nothing is
/// written. Tables that were never created read as empty.
#[derive(Clone)]
pub struct MemoryColumnStore {
    tables: Arc<RwLock<HashMap<String, BTreeMap<String, String>>>>,
    faults: Arc<FaultInjector>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(FaultInjector::new(Backend::Cassandra)),
        }
    }

    /// Failure controls and call history.
    #[must_use]
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Returns true if `ensure_table` created the table.
    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    /// Overwrites a stored blob without any checks. Used to simulate drift.
    pub fn corrupt(&self, table: &str, id: &str, data: &str) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), data.to_string());
    }

    async fn enter(&self, operation: &str, key: &str) -> CoreResult<()> {
        let latency = self.faults.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.faults.check(operation, key)
    }

    fn write_rows(&self, operation: &str, table: &str, rows: Vec<BlobRow>) -> CoreResult<()> {
        if let Some(key) = self.faults.first_rejected(rows.iter().map(|r| r.id.as_str())) {
            self.faults.record_call(operation, table, false);
            return Err(CoreError::Storage(format!(
                "row `{key}` rejected by `{table}`"
            )));
        }

        let written = match self.tables.write().get_mut(table) {
            Some(target) => {
                for row in rows {
                    target.insert(row.id, row.data);
                }
                true
            }
            None => false,
        };

        self.faults.record_call(operation, table, written);
        if written {
            Ok(())
        } else {
            Err(CoreError::not_found("table", table))
        }
    }
}

impl Default for MemoryColumnStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ColumnStore for MemoryColumnStore {
    async fn ping(&self) -> CoreResult<()> {
        self.enter("ping", "").await?;
        self.faults.record_call("ping", "", true);
        Ok(())
    }

    async fn ensure_table(&self, table: &str) -> CoreResult<()> {
        self.enter("ensure_table", table).await?;
        self.tables.write().entry(table.to_string()).or_default();
        self.faults.record_call("ensure_table", table, true);
        Ok(())
    }

    async fn upsert(&self, table: &str, row: BlobRow) -> CoreResult<()> {
        self.enter("upsert", table).await?;
        self.write_rows("upsert", table, vec![row])
    }

    async fn upsert_batch(&self, table: &str, rows: Vec<BlobRow>) -> CoreResult<()> {
        self.enter("upsert_batch", table).await?;
        self.write_rows("upsert_batch", table, rows)
    }

    async fn get(&self, table: &str, id: &str) -> CoreResult<Option<BlobRow>> {
        self.enter("get", table).await?;
        let row = self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .map(|data| BlobRow {
                id: id.to_string(),
                data: data.clone(),
            });
        self.faults.record_call("get", table, true);
        Ok(row)
    }

    async fn scan(&self, table: &str) -> CoreResult<Vec<BlobRow>> {
        self.enter("scan", table).await?;
        let rows = self
            .tables
            .read()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, data)| BlobRow {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.faults.record_call("scan", table, true);
        Ok(rows)
    }

    async fn count(&self, table: &str) -> CoreResult<u64> {
        self.enter("count", table).await?;
        let count = self
            .tables
            .read()
            .get(table)
            .map_or(0, |rows| rows.len() as u64);
        self.faults.record_call("count", table, true);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> BlobRow {
        BlobRow {
            id: id.into(),
            data: format!(r#"{{"_id":"{id}"}}"#),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let store = MemoryColumnStore::new();
        store.ensure_table("posts").await.unwrap();
        store.upsert("posts", row("a")).await.unwrap();
        store
            .upsert(
                "posts",
                BlobRow {
                    id: "a".into(),
                    data: "{}".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(store.count("posts").await.unwrap(), 1);
        assert_eq!(store.get("posts", "a").await.unwrap().unwrap().data, "{}");
    }

    #[tokio::test]
    async fn test_batch_is_atomic_on_rejection() {
        let store = MemoryColumnStore::new();
        store.ensure_table("posts").await.unwrap();
        store.faults().reject_key("b");

        let err = store
            .upsert_batch("posts", vec![row("a"), row("b"), row("c")])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(store.count("posts").await.unwrap(), 0);

        store.upsert("posts", row("a")).await.unwrap();
        assert!(store.upsert("posts", row("b")).await.is_err());
        assert_eq!(store.count("posts").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = MemoryColumnStore::new();
        assert_eq!(store.count("ghost").await.unwrap(), 0);
        assert!(store.scan("ghost").await.unwrap().is_empty());
        assert!(matches!(
            store.upsert("ghost", row("a")).await.unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_scan_is_sorted_by_id() {
        let store = MemoryColumnStore::new();
        store.ensure_table("posts").await.unwrap();
        store
            .upsert_batch("posts", vec![row("c"), row("a"), row("b")])
            .await
            .unwrap();
        let ids: Vec<String> = store.scan("posts").await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(store.faults().successful_calls("upsert_batch"), 1);
    }
}
