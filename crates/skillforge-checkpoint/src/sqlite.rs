//! A durable [`CheckpointSaver`] backed by SQLite.
//!
//! This is the concrete backend the orchestrator relies on for the
//! durable-before-advance guarantee: [`put`](CheckpointSaver::put) is a
//! single `INSERT` inside an implicit transaction and only returns once
//! `sqlx` confirms the write landed on disk.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;

/// Checkpoint persistence backed by a SQLite database.
///
/// Row layout mirrors the persisted checkpoint schema: keyed by
/// `(thread_id, checkpoint_ns, checkpoint_id)`, ordered by `ts`, carrying
/// the opaque serialized `channel_values`/`pending_writes` plus the small
/// denormalized `active_skill`/`status` projection used by status queries.
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
}

impl SqliteCheckpointSaver {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let saver = Self { pool };
        saver.migrate().await?;
        Ok(saver)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                checkpoint_ns TEXT NOT NULL DEFAULT '',
                checkpoint_id TEXT NOT NULL,
                parent_checkpoint_id TEXT,
                ts TEXT NOT NULL,
                channel_values TEXT NOT NULL,
                pending_writes TEXT NOT NULL,
                metadata TEXT NOT NULL,
                active_skill TEXT,
                status TEXT,
                PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_thread_ts ON checkpoints (thread_id, ts)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn denormalized_projection(checkpoint: &Checkpoint) -> (Option<String>, Option<String>) {
        let active_skill = checkpoint
            .channel_values
            .get("active_skill")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let status = checkpoint
            .channel_values
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        (active_skill, status)
    }

    fn row_to_tuple(row: &sqlx::sqlite::SqliteRow) -> Result<CheckpointTuple> {
        let thread_id: String = row.try_get("thread_id")?;
        let checkpoint_ns: String = row.try_get("checkpoint_ns")?;
        let checkpoint_id: String = row.try_get("checkpoint_id")?;
        let parent_checkpoint_id: Option<String> = row.try_get("parent_checkpoint_id")?;
        let channel_values_json: String = row.try_get("channel_values")?;
        let pending_writes_json: String = row.try_get("pending_writes")?;
        let metadata_json: String = row.try_get("metadata")?;
        let ts: String = row.try_get("ts")?;

        let channel_values: HashMap<String, serde_json::Value> =
            serde_json::from_str(&channel_values_json)?;
        let pending_writes = serde_json::from_str(&pending_writes_json)?;
        let metadata: CheckpointMetadata = serde_json::from_str(&metadata_json)?;

        let checkpoint = Checkpoint {
            v: Checkpoint::CURRENT_VERSION,
            id: checkpoint_id.clone(),
            ts: ts
                .parse()
                .map_err(|e| CheckpointError::Invalid(format!("bad timestamp: {e}")))?,
            channel_values,
            pending_writes,
        };

        let config = CheckpointConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_id: Some(checkpoint_id),
            checkpoint_ns: Some(checkpoint_ns.clone()),
            extra: HashMap::new(),
        };

        let parent_config = parent_checkpoint_id.map(|id| CheckpointConfig {
            thread_id: Some(thread_id),
            checkpoint_id: Some(id),
            checkpoint_ns: Some(checkpoint_ns),
            extra: HashMap::new(),
        });

        Ok(CheckpointTuple {
            config,
            checkpoint,
            metadata,
            parent_config,
        })
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config
            .thread_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))?;
        let ns = config.checkpoint_ns.clone().unwrap_or_default();

        let row = if let Some(checkpoint_id) = &config.checkpoint_id {
            sqlx::query(
                "SELECT * FROM checkpoints WHERE thread_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?",
            )
            .bind(thread_id)
            .bind(&ns)
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT * FROM checkpoints WHERE thread_id = ? AND checkpoint_ns = ? ORDER BY ts DESC LIMIT 1",
            )
            .bind(thread_id)
            .bind(&ns)
            .fetch_optional(&self.pool)
            .await?
        };

        row.map(|r| Self::row_to_tuple(&r)).transpose()
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let mut query = String::from("SELECT * FROM checkpoints WHERE 1=1");
        let mut thread_id_bind: Option<String> = None;
        let mut before_ts_bind: Option<String> = None;

        if let Some(thread_id) = config.and_then(|c| c.thread_id.clone()) {
            query.push_str(" AND thread_id = ?");
            thread_id_bind = Some(thread_id);
        }
        if let Some(before_cfg) = before {
            if let Some(before_id) = &before_cfg.checkpoint_id {
                query.push_str(" AND ts < (SELECT ts FROM checkpoints WHERE checkpoint_id = ?)");
                before_ts_bind = Some(before_id.clone());
            }
        }
        query.push_str(" ORDER BY ts DESC");
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {lim}"));
        }

        let mut q = sqlx::query(&query);
        if let Some(tid) = &thread_id_bind {
            q = q.bind(tid);
        }
        if let Some(bts) = &before_ts_bind {
            q = q.bind(bts);
        }

        let rows = q.fetch_all(&self.pool).await?;
        let mut results = Vec::new();
        for row in &rows {
            let tuple = Self::row_to_tuple(row)?;
            if let Some(filter_map) = &filter {
                let matches = filter_map
                    .iter()
                    .all(|(k, v)| tuple.metadata.extra.get(k) == Some(v));
                if !matches {
                    continue;
                }
            }
            results.push(Ok(tuple));
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let thread_id = config
            .thread_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))?;
        let ns = config.checkpoint_ns.clone().unwrap_or_default();
        let (active_skill, status) = Self::denormalized_projection(&checkpoint);

        sqlx::query(
            r#"
            INSERT INTO checkpoints
                (thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id, ts,
                 channel_values, pending_writes, metadata, active_skill, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id) DO UPDATE SET
                channel_values = excluded.channel_values,
                pending_writes = excluded.pending_writes,
                metadata = excluded.metadata,
                active_skill = excluded.active_skill,
                status = excluded.status
            "#,
        )
        .bind(thread_id)
        .bind(&ns)
        .bind(&checkpoint.id)
        .bind(&config.checkpoint_id)
        .bind(checkpoint.ts.to_rfc3339())
        .bind(serde_json::to_string(&checkpoint.channel_values)?)
        .bind(serde_json::to_string(&checkpoint.pending_writes)?)
        .bind(serde_json::to_string(&metadata)?)
        .bind(&active_skill)
        .bind(&status)
        .execute(&self.pool)
        .await?;

        Ok(CheckpointConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_id: Some(checkpoint.id),
            checkpoint_ns: Some(ns),
            extra: config.extra.clone(),
        })
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()> {
        let Some(mut tuple) = self.get_tuple(config).await? else {
            return Err(CheckpointError::NotFound(
                config.checkpoint_id.clone().unwrap_or_default(),
            ));
        };
        tuple.checkpoint.pending_writes.extend(
            writes
                .into_iter()
                .map(|(channel, value)| (task_id.clone(), channel, value)),
        );
        self.put(&tuple.config, tuple.checkpoint, tuple.metadata)
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
