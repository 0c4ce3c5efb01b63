//! Opens backend handles from configuration.

use std::sync::Arc;

use postbridge_core::{Backends, ColumnStore, DocumentStore};
use postbridge_storage::{MemoryColumnStore, MemoryDocumentStore};

use crate::config::AppConfig;

/// Set to `true` to run against process-local in-memory stores.
pub const MEMORY_BACKEND_ENV: &str = "POSTBRIDGE_USE_MEMORY_BACKEND";

/// Whether [`MEMORY_BACKEND_ENV`] asks for in-memory stores.
#[must_use]
pub fn memory_backend_requested() -> bool {
    std::env::var(MEMORY_BACKEND_ENV)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Fresh in-memory stores for both backends.
#[must_use]
pub fn memory_backends() -> Backends {
    Backends::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(MemoryColumnStore::new()),
    )
}

/// Connects to both stores.
///
/// A store that cannot be opened is logged and left out; callers decide
/// whether the current phase can do without it.
pub async fn open_backends(config: &AppConfig) -> Backends {
    if memory_backend_requested() {
        tracing::warn!(env = MEMORY_BACKEND_ENV, "using in-memory backends; data is not persisted");
        return memory_backends();
    }

    Backends {
        documents: open_mongo(config).await,
        columns: open_cassandra(config).await,
    }
}

#[cfg(feature = "mongodb")]
async fn open_mongo(config: &AppConfig) -> Option<Arc<dyn DocumentStore>> {
    let settings = postbridge_storage::MongoSettings {
        uri: config.mongo.uri.clone(),
        database: config.mongo.database.clone(),
        server_selection_timeout: config.mongo.server_selection_timeout(),
    };
    match postbridge_storage::MongoDocumentStore::connect(&settings).await {
        Ok(store) => {
            tracing::info!(database = %config.mongo.database, "MongoDB client ready");
            Some(Arc::new(store))
        }
        Err(err) => {
            tracing::warn!(error = %err, "MongoDB is not available");
            None
        }
    }
}

#[cfg(not(feature = "mongodb"))]
async fn open_mongo(_config: &AppConfig) -> Option<Arc<dyn DocumentStore>> {
    tracing::warn!("built without the mongodb feature; MongoDB is not available");
    None
}

#[cfg(feature = "cassandra")]
async fn open_cassandra(config: &AppConfig) -> Option<Arc<dyn ColumnStore>> {
    let settings = postbridge_storage::CassandraSettings {
        contact_points: config.cassandra.contact_points.clone(),
        port: config.cassandra.port,
        keyspace: config.cassandra.keyspace.clone(),
        replication_factor: config.cassandra.replication_factor,
        connection_timeout: config.cassandra.connect_timeout(),
    };
    match postbridge_storage::CassandraColumnStore::connect(&settings).await {
        Ok(store) => {
            tracing::info!(keyspace = %config.cassandra.keyspace, "Cassandra session ready");
            Some(Arc::new(store))
        }
        Err(err) => {
            tracing::warn!(error = %err, "Cassandra is not available");
            None
        }
    }
}

#[cfg(not(feature = "cassandra"))]
async fn open_cassandra(_config: &AppConfig) -> Option<Arc<dyn ColumnStore>> {
    tracing::warn!("built without the cassandra feature; Cassandra is not available");
    None
}

#[cfg(test)]
mod tests {
    use postbridge_core::Backend;

    use super::*;

    #[test]
    fn test_memory_backends_have_both_stores() {
        let backends = memory_backends();
        assert!(backends.has(Backend::Mongo));
        assert!(backends.has(Backend::Cassandra));
    }

    #[cfg(not(any(feature = "mongodb", feature = "cassandra")))]
    #[tokio::test]
    async fn test_driverless_build_opens_nothing() {
        if memory_backend_requested() {
            return;
        }
        let backends = open_backends(&AppConfig::default()).await;
        assert!(!backends.has(Backend::Mongo));
        assert!(!backends.has(Backend::Cassandra));
    }
}
