//! MongoDB document store.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{self, doc, Bson, Document as BsonDocument};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::{debug, info};

use postbridge_core::document::ID_FIELD;
use postbridge_core::{
    document_id, Backend, CoreError, CoreResult, Document, DocumentStore, DocumentStream,
};

/// Connection settings for [`MongoDocumentStore`].
#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub server_selection_timeout: Duration,
}

/// Document store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Builds a client. No round trip happens until the first operation.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when the URI cannot be parsed or resolved.
    pub async fn connect(settings: &MongoSettings) -> CoreResult<Self> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .map_err(map_error)?;
        options.server_selection_timeout = Some(settings.server_selection_timeout);
        options.app_name = Some("postbridge".to_string());

        let client = Client::with_options(options).map_err(map_error)?;
        info!(database = %settings.database, "MongoDB client created");
        Ok(Self {
            database: client.database(&settings.database),
        })
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }
}

/// Classifies driver errors: connectivity failures become `BackendUnavailable`.
fn map_error(err: MongoError) -> CoreError {
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => CoreError::unavailable(Backend::Mongo, err.to_string()),
        _ => CoreError::Storage(err.to_string()),
    }
}

fn to_bson(document: Document) -> CoreResult<BsonDocument> {
    bson::to_document(&Value::Object(document))
        .map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Converts a BSON document to relaxed extended JSON with `_id` as a plain string.
fn to_json(document: BsonDocument) -> CoreResult<Document> {
    let Value::Object(mut json) = Bson::Document(document).into_relaxed_extjson() else {
        return Err(CoreError::internal("BSON document did not convert to an object"));
    };
    if let Some(id) = document_id(&json) {
        json.insert(ID_FIELD.into(), Value::String(id));
    }
    Ok(json)
}

fn inserted_id(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn ping(&self) -> CoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn list_collections(&self) -> CoreResult<Vec<String>> {
        let mut names = self
            .database
            .list_collection_names(None)
            .await
            .map_err(map_error)?;
        names.sort();
        Ok(names)
    }

    async fn insert(&self, collection: &str, document: Document) -> CoreResult<String> {
        let result = self
            .collection(collection)
            .insert_one(to_bson(document)?, None)
            .await
            .map_err(map_error)?;
        let id = inserted_id(result.inserted_id);
        debug!(collection, id = %id, "inserted document");
        Ok(id)
    }

    async fn find_all(&self, collection: &str) -> CoreResult<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .find(None, None)
            .await
            .map_err(map_error)?;
        let raw: Vec<BsonDocument> = cursor.try_collect().await.map_err(map_error)?;
        raw.into_iter().map(to_json).collect()
    }

    async fn find_stream(&self, collection: &str) -> CoreResult<DocumentStream> {
        let cursor = self
            .collection(collection)
            .find(None, None)
            .await
            .map_err(map_error)?;
        Ok(cursor
            .map(|next| next.map_err(map_error).and_then(to_json))
            .boxed())
    }

    async fn count(&self, collection: &str) -> CoreResult<u64> {
        self.collection(collection)
            .count_documents(None, None)
            .await
            .map_err(map_error)
    }

    async fn delete_all(&self, collection: &str) -> CoreResult<u64> {
        let result = self
            .collection(collection)
            .delete_many(doc! {}, None)
            .await
            .map_err(map_error)?;
        Ok(result.deleted_count)
    }

    async fn drop_collection(&self, collection: &str) -> CoreResult<()> {
        self.collection(collection)
            .drop(None)
            .await
            .map_err(map_error)
    }
}
