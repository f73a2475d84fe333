//! The [`CheckpointSaver`] trait — the storage-backend abstraction every
//! durability guarantee in this crate is built on.
//!
//! Implementations must be thread-safe and must isolate checkpoint history
//! per `thread_id`. [`put`](CheckpointSaver::put) is the durability boundary:
//! the orchestrator above this crate is not allowed to advance a run's
//! planner tick until `put` has returned successfully.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Async stream of checkpoint tuples, newest first.
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Convenience wrapper over [`get_tuple`](Self::get_tuple) that discards metadata.
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|t| t.checkpoint))
    }

    /// Fetch a checkpoint tuple. With only `thread_id` set, returns the
    /// latest checkpoint for that thread; with `checkpoint_id` set, returns
    /// that exact checkpoint. Returns `Ok(None)` (never an error) when
    /// nothing matches.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Stream checkpoints newest-first, optionally scoped to a thread,
    /// filtered by metadata fields, paginated via `before`, and bounded by
    /// `limit`.
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Durably persist a new checkpoint row, returning the config with its
    /// resolved `checkpoint_id`. This is the single durability boundary the
    /// orchestrator depends on: callers MUST NOT proceed to the next
    /// planner tick until this returns `Ok`.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Store writes staged by an in-flight task (e.g. a `parallel` pipeline
    /// branch) ahead of the next `put`, keyed by `task_id` for provenance.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Delete all checkpoints for a thread. Default no-op for read-mostly backends.
    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _ = thread_id;
        Ok(())
    }
}
