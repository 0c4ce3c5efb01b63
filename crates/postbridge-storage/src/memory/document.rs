use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use postbridge_core::document::ID_FIELD;
use postbridge_core::{document_id, Backend, CoreError, CoreResult, Document, DocumentStore};

use super::fault::FaultInjector;

/// In-memory MongoDB stand-in.
///
/// Collections are created on first insert. Documents without an `_id` get a
/// 24-hex id shaped like a MongoDB object id.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, Document>>>>,
    counter: Arc<AtomicU64>,
    faults: Arc<FaultInjector>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(1)),
            faults: Arc::new(FaultInjector::new(Backend::Mongo)),
        }
    }

    /// Failure controls and call history.
    #[must_use]
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Number of documents across all collections.
    #[must_use]
    pub fn total_documents(&self) -> usize {
        self.collections.read().values().map(BTreeMap::len).sum()
    }

    /// Stores a document under `key` without validating its `_id`.
    /// Used to simulate legacy data that the migrator must cope with.
    pub fn insert_unchecked(&self, collection: &str, key: &str, document: Document) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
    }

    fn next_object_id(&self) -> String {
        let secs = Utc::now().timestamp() as u32;
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{secs:08x}{seq:016x}")
    }

    async fn enter(&self, operation: &str, key: &str) -> CoreResult<()> {
        let latency = self.faults.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.faults.check(operation, key)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> CoreResult<()> {
        self.enter("ping", "").await?;
        self.faults.record_call("ping", "", true);
        Ok(())
    }

    async fn list_collections(&self) -> CoreResult<Vec<String>> {
        self.enter("list_collections", "").await?;
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        self.faults.record_call("list_collections", "", true);
        Ok(names)
    }

    async fn insert(&self, collection: &str, mut document: Document) -> CoreResult<String> {
        self.enter("insert", collection).await?;

        let id = match document.get(ID_FIELD) {
            None => {
                let id = self.next_object_id();
                document.insert(ID_FIELD.into(), Value::String(id.clone()));
                id
            }
            Some(_) => document_id(&document).ok_or_else(|| {
                CoreError::Validation(format!("unsupported `_id` in `{collection}`"))
            })?,
        };

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            drop(collections);
            self.faults.record_call("insert", collection, false);
            return Err(CoreError::Storage(format!(
                "duplicate key `{id}` in `{collection}`"
            )));
        }
        docs.insert(id.clone(), document);
        drop(collections);

        self.faults.record_call("insert", collection, true);
        Ok(id)
    }

    async fn find_all(&self, collection: &str) -> CoreResult<Vec<Document>> {
        self.enter("find_all", collection).await?;
        let docs = self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        self.faults.record_call("find_all", collection, true);
        Ok(docs)
    }

    async fn count(&self, collection: &str) -> CoreResult<u64> {
        self.enter("count", collection).await?;
        let count = self
            .collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len() as u64);
        self.faults.record_call("count", collection, true);
        Ok(count)
    }

    async fn delete_all(&self, collection: &str) -> CoreResult<u64> {
        self.enter("delete_all", collection).await?;
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .map_or(0, |docs| {
                let n = docs.len() as u64;
                docs.clear();
                n
            });
        self.faults.record_call("delete_all", collection, true);
        Ok(removed)
    }

    async fn drop_collection(&self, collection: &str) -> CoreResult<()> {
        self.enter("drop_collection", collection).await?;
        self.collections.write().remove(collection);
        self.faults.record_call("drop_collection", collection, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_object_id() {
        let store = MemoryDocumentStore::new();
        let id = store.insert("posts", doc(json!({"title": "a"}))).await.unwrap();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let docs = store.find_all("posts").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], json!(id));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = MemoryDocumentStore::new();
        store.insert("posts", doc(json!({"_id": "x"}))).await.unwrap();
        let err = store.insert("posts", doc(json!({"_id": "x"}))).await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(store.count("posts").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_drop() {
        let store = MemoryDocumentStore::new();
        for i in 0..3 {
            store.insert("posts", doc(json!({"n": i}))).await.unwrap();
        }
        assert_eq!(store.delete_all("posts").await.unwrap(), 3);
        assert_eq!(store.list_collections().await.unwrap(), vec!["posts"]);
        store.drop_collection("posts").await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
        store.drop_collection("posts").await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = MemoryDocumentStore::new();
        store.faults().set_offline(true);
        assert!(store.ping().await.unwrap_err().is_unavailable());
        assert!(store.find_all("posts").await.unwrap_err().is_unavailable());
    }
}
