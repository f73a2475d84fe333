//! In-memory [`CheckpointSaver`] — the reference implementation used by
//! tests and by `PollingPubSub` examples. Not durable across restarts; see
//! [`crate::sqlite::SqliteCheckpointSaver`] for the persisted backend.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    config: CheckpointConfig,
    parent_config: Option<CheckpointConfig>,
}

type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>;

#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn checkpoint_count(&self) -> usize {
        self.storage.read().await.values().map(|e| e.len()).sum()
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let storage = self.storage.read().await;

        let thread_id = config
            .thread_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))?;

        let Some(entries) = storage.get(thread_id) else {
            return Ok(None);
        };

        let found = if let Some(checkpoint_id) = &config.checkpoint_id {
            entries.iter().find(|e| &e.checkpoint.id == checkpoint_id)
        } else {
            entries.last()
        };

        Ok(found.map(|entry| CheckpointTuple {
            config: entry.config.clone(),
            checkpoint: entry.checkpoint.clone(),
            metadata: entry.metadata.clone(),
            parent_config: entry.parent_config.clone(),
        }))
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let mut results = Vec::new();

        let thread_ids: Vec<String> = match config.and_then(|c| c.thread_id.clone()) {
            Some(thread_id) => vec![thread_id],
            None => storage.keys().cloned().collect(),
        };

        'threads: for thread_id in thread_ids {
            let Some(entries) = storage.get(&thread_id) else {
                continue;
            };
            for entry in entries.iter().rev() {
                if let Some(before_cfg) = before {
                    if let Some(before_id) = &before_cfg.checkpoint_id {
                        if entry.checkpoint.id >= *before_id {
                            continue;
                        }
                    }
                }

                if let Some(filter_map) = &filter {
                    let matches = filter_map
                        .iter()
                        .all(|(k, v)| entry.metadata.extra.get(k) == Some(v));
                    if !matches {
                        continue;
                    }
                }

                results.push(Ok(CheckpointTuple {
                    config: entry.config.clone(),
                    checkpoint: entry.checkpoint.clone(),
                    metadata: entry.metadata.clone(),
                    parent_config: entry.parent_config.clone(),
                }));

                if limit.is_some_and(|lim| results.len() >= lim) {
                    break 'threads;
                }
            }
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

        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.clone()).or_default();

        let checkpoint_config = CheckpointConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_id: Some(checkpoint.id.clone()),
            checkpoint_ns: config.checkpoint_ns.clone(),
            extra: config.extra.clone(),
        };

        entries.push(CheckpointEntry {
            checkpoint,
            metadata,
            config: checkpoint_config.clone(),
            parent_config: config.checkpoint_id.as_ref().map(|_| config.clone()),
        });

        Ok(checkpoint_config)
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()> {
        let thread_id = config
            .thread_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))?;
        let checkpoint_id = config
            .checkpoint_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("checkpoint_id is required".to_string()))?;

        let mut storage = self.storage.write().await;
        let entries = storage
            .get_mut(thread_id)
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.clone()))?;
        let entry = entries
            .iter_mut()
            .find(|e| &e.checkpoint.id == checkpoint_id)
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.clone()))?;

        entry.checkpoint.pending_writes.extend(
            writes
                .into_iter()
                .map(|(channel, value)| (task_id.clone(), channel, value)),
        );
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;

    #[tokio::test]
    async fn save_and_load_checkpoint() {
        let saver = InMemoryCheckpointSaver::new();
        let checkpoint = Checkpoint::empty();
        let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input);
        let config = CheckpointConfig::new().with_thread_id("thread-1".to_string());

        let saved_config = saver
            .put(&config, checkpoint.clone(), metadata)
            .await
            .unwrap();
        assert!(saved_config.checkpoint_id.is_some());

        let tuple = saver.get_tuple(&saved_config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.id, checkpoint.id);
    }

    #[tokio::test]
    async fn latest_checkpoint_wins_without_an_explicit_id() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new().with_thread_id("thread-1".to_string());

        for step in 0..3 {
            saver
                .put(
                    &config,
                    Checkpoint::empty(),
                    CheckpointMetadata::new().with_step(step),
                )
                .await
                .unwrap();
        }

        let latest = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(latest.metadata.step, Some(2));
    }

    #[tokio::test]
    async fn list_returns_all_checkpoints_for_a_thread() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new().with_thread_id("thread-1".to_string());

        for i in 0..3 {
            saver
                .put(
                    &config,
                    Checkpoint::empty(),
                    CheckpointMetadata::new().with_step(i),
                )
                .await
                .unwrap();
        }

        let stream = saver.list(Some(&config), None, None, None).await.unwrap();
        use futures::StreamExt;
        let results: Vec<_> = stream.collect().await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn delete_thread_removes_all_its_checkpoints() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new().with_thread_id("thread-1".to_string());
        saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new())
            .await
            .unwrap();
        assert_eq!(saver.thread_count().await, 1);

        saver.delete_thread("thread-1").await.unwrap();
        assert_eq!(saver.thread_count().await, 0);
    }

    #[tokio::test]
    async fn put_writes_accumulates_on_the_target_checkpoint() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new().with_thread_id("thread-1".to_string());
        let saved_config = saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new())
            .await
            .unwrap();

        saver
            .put_writes(
                &saved_config,
                vec![("channel1".to_string(), serde_json::json!(42))],
                "task-1".to_string(),
            )
            .await
            .unwrap();

        let tuple = saver.get_tuple(&saved_config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.pending_writes.len(), 1);
    }
}
