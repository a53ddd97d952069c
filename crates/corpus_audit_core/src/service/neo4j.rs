//! Neo4j adapter over the bolt driver.
//!
//! The driver is async; the catalog is not. A current-thread runtime owned
//! by [`Neo4jService`] drives each query to completion, so dropping the
//! service closes the connection pool along with the runtime.

use neo4rs::{query, ConfigBuilder, Graph};
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{AuditError, Result};
use crate::query::{GraphQuery, GraphQueryService, Record};

// Fields drop in declaration order: the pool closes while its runtime is alive.
pub struct Neo4jService {
    graph: Graph,
    runtime: Runtime,
}

impl Neo4jService {
    /// Open a pool against `config.uri` and confirm it answers a query.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(AuditError::Runtime)?;

        let connect_err = |source| AuditError::Connect {
            uri: config.uri.clone(),
            source,
        };

        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str());
        if let Some(database) = config.database.as_deref() {
            builder = builder.db(database);
        }
        let driver_config = builder.build().map_err(connect_err)?;

        let graph = runtime
            .block_on(Graph::connect(driver_config))
            .map_err(connect_err)?;
        runtime
            .block_on(async {
                let mut rows = graph.execute(query("RETURN 1 AS ok")).await?;
                while rows.next().await?.is_some() {}
                Ok::<_, neo4rs::Error>(())
            })
            .map_err(connect_err)?;

        info!(target: "corpus_audit.neo4j", uri = %config.uri, "connected to graph service");
        Ok(Self { graph, runtime })
    }
}

impl GraphQueryService for Neo4jService {
    fn fetch(&self, request: &GraphQuery) -> Result<Vec<Record>> {
        let probe = request.probe.name();
        let mut statement = query(&request.cypher());
        for (name, value) in request.params() {
            statement = statement.param(name, value);
        }

        let rows = self
            .runtime
            .block_on(async {
                let mut stream = self.graph.execute(statement).await?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await? {
                    rows.push(row);
                }
                Ok::<_, neo4rs::Error>(rows)
            })
            .map_err(|source| AuditError::Query { probe, source })?;

        debug!(target: "corpus_audit.neo4j", probe, rows = rows.len(), "probe answered");

        rows.iter()
            .map(|row| {
                request
                    .columns()
                    .iter()
                    .map(|&column| {
                        row.get::<Value>(column)
                            .map(|value| (column, value))
                            .map_err(|err| AuditError::Decode {
                                probe,
                                column,
                                message: err.to_string(),
                            })
                    })
                    .collect::<Result<Record>>()
            })
            .collect()
    }
}
