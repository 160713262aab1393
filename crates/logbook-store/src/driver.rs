//! `CqlSession` over the scylla driver.

use std::time::Duration;

use async_trait::async_trait;
use logbook_settings::ClusterSettings;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::{Batch, BatchType};
use scylla::statement::prepared::PreparedStatement;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema::{create_keyspace_cql, TABLES};
use crate::session::{BatchKind, CqlSession, CqlValue, Row};

pub struct ScyllaSession {
    inner: Session,
}

impl ScyllaSession {
    /// Connect to the cluster and select the configured keyspace.
    pub async fn connect(settings: &ClusterSettings) -> Result<Self, StoreError> {
        let nodes = settings.known_nodes();
        info!(nodes = ?nodes, keyspace = %settings.keyspace, "connecting to cluster");

        let mut builder = SessionBuilder::new()
            .known_nodes(&nodes)
            .connection_timeout(Duration::from_millis(settings.connect_timeout_ms));
        if let Some((user, password)) = settings.credentials() {
            builder = builder.user(user, password);
        }
        let inner = builder
            .build()
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        let session = Self { inner };

        if settings.create_schema {
            session.run_ddl(&create_keyspace_cql(&settings.keyspace, 1)).await?;
        }
        session
            .inner
            .use_keyspace(&settings.keyspace, false)
            .await
            .map_err(|e| StoreError::Keyspace(format!("{}: {e}", settings.keyspace)))?;
        if settings.create_schema {
            for table in TABLES {
                session.run_ddl(&table.create_cql()).await?;
            }
            info!(keyspace = %settings.keyspace, "schema ensured");
        }

        info!(keyspace = %settings.keyspace, "connected");
        Ok(session)
    }

    async fn run_ddl(&self, cql: &str) -> Result<(), StoreError> {
        debug!(cql, "schema statement");
        self.inner
            .query_unpaged(cql, ())
            .await
            .map_err(|e| StoreError::Execution(e.to_string()))?;
        Ok(())
    }
}

fn collect_rows(result: QueryResult) -> Result<Vec<Row>, StoreError> {
    if !result.is_rows() {
        return Ok(Vec::new());
    }
    let rows = result
        .into_rows_result()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let decoded = rows
        .rows::<Row>()
        .map_err(|e| StoreError::Decode(e.to_string()))?
        .map(|row| row.map_err(|e| StoreError::Decode(e.to_string())))
        .collect::<Result<Vec<_>, _>>();
    decoded
}

#[async_trait]
impl CqlSession for ScyllaSession {
    type Prepared = PreparedStatement;

    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, StoreError> {
        self.inner
            .prepare(cql)
            .await
            .map_err(|e| StoreError::Prepare {
                statement: cql.to_string(),
                detail: e.to_string(),
            })
    }

    async fn query(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<Row>, StoreError> {
        let result = self
            .inner
            .query_unpaged(cql, values)
            .await
            .map_err(|e| StoreError::Execution(e.to_string()))?;
        collect_rows(result)
    }

    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: Vec<CqlValue>,
    ) -> Result<Vec<Row>, StoreError> {
        let result = self
            .inner
            .execute_unpaged(statement, values)
            .await
            .map_err(|e| StoreError::Execution(e.to_string()))?;
        collect_rows(result)
    }

    async fn batch(
        &self,
        kind: BatchKind,
        statements: Vec<(PreparedStatement, Vec<CqlValue>)>,
    ) -> Result<(), StoreError> {
        let mut batch = Batch::new(match kind {
            BatchKind::Unlogged => BatchType::Unlogged,
            BatchKind::Counter => BatchType::Counter,
        });
        let mut values = Vec::with_capacity(statements.len());
        for (statement, bound) in statements {
            batch.append_statement(statement);
            values.push(bound);
        }
        self.inner
            .batch(&batch, values)
            .await
            .map_err(|e| StoreError::Execution(e.to_string()))?;
        Ok(())
    }
}
