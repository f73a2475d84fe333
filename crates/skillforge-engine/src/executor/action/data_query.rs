//! The `data_query` action sub-handler (§4.6.2): resolves a credential,
//! opens a typed connection, renders the query template, executes it, and
//! closes the connection. A [`sqlite`](SqliteConnector) connector is a real,
//! testable implementation; other sources are trait seams only — no
//! fabricated drivers for vendors this workspace doesn't actually depend on.

use crate::context::ExecutionContext;
use crate::executor::llm::render_template;
use async_trait::async_trait;
use serde_json::{json, Value};
use skillforge_core::{ActionConfig, Credential, EngineError, ExecutorErrorKind, Result, Skill};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A typed connection to a queryable data source. `connect`/`query`/`close`
/// are collapsed into one call here since every current caller opens a
/// connection, runs exactly one query, and is done with it — there is no
/// pooling or transaction state for a caller to hold onto across calls.
#[async_trait]
pub trait DataConnector: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn query(&self, rendered_query: &str, credential: Option<&Credential>) -> anyhow::Result<(Vec<Value>, u64)>;
}

/// A real `sqlite` connector backed by a connection pool.
pub struct SqliteConnector {
    pool: SqlitePool,
}

impl SqliteConnector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataConnector for SqliteConnector {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn query(&self, rendered_query: &str, _credential: Option<&Credential>) -> anyhow::Result<(Vec<Value>, u64)> {
        let rows = sqlx::query(rendered_query).fetch_all(&self.pool).await?;
        let row_count = rows.len() as u64;
        let values = rows.iter().map(row_to_json).collect();
        Ok((values, row_count))
    }
}

fn row_to_json(row: &sqlx::sqlite::SqliteRow) -> Value {
    let mut map = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).ok();
        let value = match raw {
            Some(raw) if !raw.is_null() => match column.type_info().name() {
                "INTEGER" | "BIGINT" => row.try_get::<i64, _>(i).map(Value::from).unwrap_or(Value::Null),
                "REAL" | "DOUBLE" | "FLOAT" => row.try_get::<f64, _>(i).map(Value::from).unwrap_or(Value::Null),
                "BOOLEAN" => row.try_get::<bool, _>(i).map(Value::from).unwrap_or(Value::Null),
                _ => row.try_get::<String, _>(i).map(Value::from).unwrap_or(Value::Null),
            },
            _ => Value::Null,
        };
        map.insert(column.name().to_string(), value);
    }
    Value::Object(map)
}

/// A connector kind with no real driver wired into this workspace: a trait
/// seam only, so `data_query` manifests that name it still parse and
/// validate, they just fail at execution time rather than compile time.
pub struct UnimplementedConnector {
    kind: &'static str,
}

impl UnimplementedConnector {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DataConnector for UnimplementedConnector {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn query(&self, _rendered_query: &str, _credential: Option<&Credential>) -> anyhow::Result<(Vec<Value>, u64)> {
        anyhow::bail!("connector '{}' has no driver wired into this deployment", self.kind)
    }
}

pub struct DataQueryHandler {
    connectors: BTreeMap<String, Arc<dyn DataConnector>>,
}

impl DataQueryHandler {
    pub fn new() -> Self {
        Self {
            connectors: BTreeMap::new(),
        }
    }

    pub fn with_connector(mut self, name: impl Into<String>, connector: Arc<dyn DataConnector>) -> Self {
        self.connectors.insert(name.into(), connector);
        self
    }

    pub async fn run(
        &self,
        skill: &Skill,
        config: &ActionConfig,
        resolved_inputs: &BTreeMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let ActionConfig::DataQuery {
            connector,
            query,
            credential_ref,
            ..
        } = config
        else {
            unreachable!("dispatched only for data_query configs")
        };

        let fatal = |message: String| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::DbQueryFailed,
            message,
        };

        let connector = self
            .connectors
            .get(connector)
            .ok_or_else(|| fatal(format!("no connector registered under name '{connector}'")))?;

        let credential = match credential_ref {
            Some(credential_ref) => Some(
                ctx.credential_client
                    .resolve(credential_ref, ctx.workspace_id.as_deref())
                    .await
                    .map_err(|e| fatal(e.to_string()))?,
            ),
            None => None,
        };

        let data_store = Value::Object(resolved_inputs.clone().into_iter().collect());
        let rendered_query = render_template(query, &data_store);

        let (rows, row_count) = connector
            .query(&rendered_query, credential.as_ref())
            .await
            .map_err(|e| fatal(e.to_string()))?;

        Ok(json!({ "query_result": rows, "row_count": row_count }))
    }
}

impl Default for DataQueryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_core::StaticCredentialClient;
    use std::collections::BTreeSet;

    fn skill() -> Skill {
        Skill {
            name: "lookup".to_string(),
            description: "d".to_string(),
            requires: BTreeSet::new(),
            produces: BTreeSet::from(["rows".to_string()]),
            optional_produces: BTreeSet::new(),
            executor: skillforge_core::ExecutorKind::Action,
            hitl_enabled: false,
            prompt: None,
            system_prompt: None,
            rest_config: None,
            action_config: Some(ActionConfig::DataQuery {
                connector: "main".to_string(),
                query: "select 1".to_string(),
                credential_ref: None,
                timeout_ms: 5000,
            }),
            version: 1,
            tags: vec![],
            source: None,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("t1", "owner-1", Arc::new(StaticCredentialClient::new()))
    }

    #[tokio::test]
    async fn unregistered_connector_is_a_fatal_db_query_failed_error() {
        let handler = DataQueryHandler::new();
        let err = handler
            .run(&skill(), skill().action_config.as_ref().unwrap(), &BTreeMap::new(), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "executor_error");
    }

    #[tokio::test]
    async fn trait_seam_connector_fails_at_execution_not_parse_time() {
        let handler = DataQueryHandler::new().with_connector("main", Arc::new(UnimplementedConnector::new("postgres")));
        let err = handler
            .run(&skill(), skill().action_config.as_ref().unwrap(), &BTreeMap::new(), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "executor_error");
    }
}
