//! Cassandra column store storing documents as `(id text PRIMARY KEY, data text)`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use scylla::batch::{Batch, BatchType};
use scylla::prepared_statement::PreparedStatement;
use scylla::transport::errors::{NewSessionError, QueryError};
use scylla::{Session, SessionBuilder};
use tracing::{debug, info};

use postbridge_core::{table_name_for, Backend, BlobRow, ColumnStore, CoreError, CoreResult};

/// Connection settings for [`CassandraColumnStore`].
#[derive(Debug, Clone)]
pub struct CassandraSettings {
    pub contact_points: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub replication_factor: u32,
    pub connection_timeout: Duration,
}

impl CassandraSettings {
    fn known_nodes(&self) -> Vec<String> {
        self.contact_points
            .iter()
            .map(|host| {
                if host.contains(':') {
                    host.clone()
                } else {
                    format!("{host}:{}", self.port)
                }
            })
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Statement {
    Upsert,
    Get,
}

/// Column store backed by a Cassandra keyspace.
pub struct CassandraColumnStore {
    session: Session,
    keyspace: String,
    known_tables: RwLock<HashSet<String>>,
    prepared: RwLock<HashMap<(String, Statement), PreparedStatement>>,
}

impl CassandraColumnStore {
    /// Connects, creates the keyspace if needed and switches to it.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when no contact point answers, or
    /// `Validation` when the keyspace name is not a CQL identifier.
    pub async fn connect(settings: &CassandraSettings) -> CoreResult<Self> {
        let keyspace = table_name_for(&settings.keyspace)?;

        let mut builder = SessionBuilder::new().connection_timeout(settings.connection_timeout);
        for node in settings.known_nodes() {
            builder = builder.known_node(node);
        }
        let session = builder.build().await.map_err(map_session_error)?;

        let ddl = format!(
            "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            settings.replication_factor
        );
        session.query(ddl, ()).await.map_err(map_query_error)?;
        session
            .use_keyspace(&keyspace, false)
            .await
            .map_err(map_query_error)?;

        info!(keyspace = %keyspace, nodes = ?settings.contact_points, "Cassandra session ready");
        Ok(Self {
            session,
            keyspace,
            known_tables: RwLock::new(HashSet::new()),
            prepared: RwLock::new(HashMap::new()),
        })
    }

    async fn table_exists(&self, table: &str) -> CoreResult<bool> {
        if self.known_tables.read().contains(table) {
            return Ok(true);
        }
        let result = self
            .session
            .query(
                "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ? AND table_name = ?",
                (self.keyspace.as_str(), table),
            )
            .await
            .map_err(map_query_error)?;
        let exists = result.rows_num().unwrap_or(0) > 0;
        if exists {
            self.known_tables.write().insert(table.to_string());
        }
        Ok(exists)
    }

    async fn statement(&self, table: &str, kind: Statement) -> CoreResult<PreparedStatement> {
        let key = (table.to_string(), kind);
        if let Some(prepared) = self.prepared.read().get(&key) {
            return Ok(prepared.clone());
        }
        let cql = match kind {
            Statement::Upsert => format!("INSERT INTO {table} (id, data) VALUES (?, ?)"),
            Statement::Get => format!("SELECT id, data FROM {table} WHERE id = ?"),
        };
        let prepared = self.session.prepare(cql).await.map_err(map_query_error)?;
        self.prepared.write().insert(key, prepared.clone());
        Ok(prepared)
    }
}

fn map_session_error(err: NewSessionError) -> CoreError {
    CoreError::unavailable(Backend::Cassandra, err.to_string())
}

/// Classifies driver errors: server-side rejections are `Storage`, everything
/// else (I/O, timeouts, no connections) is `BackendUnavailable`.
fn map_query_error(err: QueryError) -> CoreError {
    match err {
        QueryError::DbError(_, _) | QueryError::BadQuery(_) => CoreError::Storage(err.to_string()),
        other => CoreError::unavailable(Backend::Cassandra, other.to_string()),
    }
}

#[async_trait]
impl ColumnStore for CassandraColumnStore {
    async fn ping(&self) -> CoreResult<()> {
        self.session
            .query("SELECT release_version FROM system.local", ())
            .await
            .map_err(map_query_error)?;
        Ok(())
    }

    async fn ensure_table(&self, table: &str) -> CoreResult<()> {
        let table = table_name_for(table)?;
        if self.known_tables.read().contains(&table) {
            return Ok(());
        }
        let ddl = format!("CREATE TABLE IF NOT EXISTS {table} (id text PRIMARY KEY, data text)");
        self.session.query(ddl, ()).await.map_err(map_query_error)?;
        self.session
            .await_schema_agreement()
            .await
            .map_err(map_query_error)?;
        self.known_tables.write().insert(table.clone());
        debug!(table = %table, "table ready");
        Ok(())
    }

    async fn upsert(&self, table: &str, row: BlobRow) -> CoreResult<()> {
        let table = table_name_for(table)?;
        let prepared = self.statement(&table, Statement::Upsert).await?;
        self.session
            .execute(&prepared, (row.id, row.data))
            .await
            .map_err(map_query_error)?;
        Ok(())
    }

    async fn upsert_batch(&self, table: &str, rows: Vec<BlobRow>) -> CoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = table_name_for(table)?;
        let prepared = self.statement(&table, Statement::Upsert).await?;

        let mut batch = Batch::new(BatchType::Logged);
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            batch.append_statement(prepared.clone());
            values.push((row.id, row.data));
        }
        self.session
            .batch(&batch, values)
            .await
            .map_err(map_query_error)?;
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> CoreResult<Option<BlobRow>> {
        let table = table_name_for(table)?;
        if !self.table_exists(&table).await? {
            return Ok(None);
        }
        let prepared = self.statement(&table, Statement::Get).await?;
        let result = self
            .session
            .execute(&prepared, (id,))
            .await
            .map_err(map_query_error)?;
        let row = result
            .maybe_first_row_typed::<(String, Option<String>)>()
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(row.map(|(id, data)| BlobRow {
            id,
            data: data.unwrap_or_default(),
        }))
    }

    async fn scan(&self, table: &str) -> CoreResult<Vec<BlobRow>> {
        let table = table_name_for(table)?;
        if !self.table_exists(&table).await? {
            return Ok(Vec::new());
        }
        let mut stream = self
            .session
            .query_iter(format!("SELECT id, data FROM {table}"), ())
            .await
            .map_err(map_query_error)?
            .into_typed::<(String, Option<String>)>();

        let mut rows = Vec::new();
        while let Some(next) = stream.next().await {
            let (id, data) = next.map_err(|e| CoreError::Storage(e.to_string()))?;
            rows.push(BlobRow {
                id,
                data: data.unwrap_or_default(),
            });
        }
        Ok(rows)
    }

    async fn count(&self, table: &str) -> CoreResult<u64> {
        let table = table_name_for(table)?;
        if !self.table_exists(&table).await? {
            return Ok(0);
        }
        let result = self
            .session
            .query(format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .map_err(map_query_error)?;
        let (count,) = result
            .single_row_typed::<(i64,)>()
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
