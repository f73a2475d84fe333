//! A [`CheckpointSaver`] decorator that batches writes in memory and flushes
//! them to an inner saver once a size or time threshold is hit.
//!
//! Durability is still guaranteed at the boundary the orchestrator cares
//! about: callers that need the "durable before advancing" guarantee should
//! call [`BufferedCheckpointSaver::flush`] (or rely on `put`'s immediate
//! flush when the buffer is full) rather than assume background flushing
//! alone satisfies it for every checkpoint.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

struct PendingPut {
    config: CheckpointConfig,
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
}

/// Wraps any [`CheckpointSaver`] with a bounded write buffer, flushing when
/// either `max_buffered` checkpoints have accumulated or `flush_interval`
/// has elapsed since the last flush — whichever comes first.
pub struct BufferedCheckpointSaver<S: CheckpointSaver> {
    inner: Arc<S>,
    buffer: Mutex<Vec<PendingPut>>,
    last_flush: Mutex<Instant>,
    max_buffered: usize,
    flush_interval: Duration,
    max_flush_attempts: u32,
}

impl<S: CheckpointSaver> BufferedCheckpointSaver<S> {
    pub fn new(inner: S, max_buffered: usize, flush_interval: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            max_buffered,
            flush_interval,
            max_flush_attempts: 3,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Flush all buffered writes to the inner saver, retrying with bounded
    /// exponential backoff before surfacing `checkpoint_flush_error`.
    pub async fn flush(&self) -> Result<()> {
        let pending: Vec<PendingPut> = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };

        if pending.is_empty() {
            *self.last_flush.lock().await = Instant::now();
            return Ok(());
        }

        for item in pending {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self
                    .inner
                    .put(&item.config, item.checkpoint.clone(), item.metadata.clone())
                    .await
                {
                    Ok(_) => break,
                    Err(e) if attempt < self.max_flush_attempts => {
                        warn!(attempt, error = %e, "checkpoint flush attempt failed, retrying");
                        tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                    }
                    Err(e) => {
                        return Err(CheckpointError::FlushFailed {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        *self.last_flush.lock().await = Instant::now();
        Ok(())
    }

    async fn should_flush(&self) -> bool {
        let buffer_len = self.buffer.lock().await.len();
        if buffer_len >= self.max_buffered {
            return true;
        }
        let elapsed = self.last_flush.lock().await.elapsed();
        elapsed >= self.flush_interval
    }
}

#[async_trait]
impl<S: CheckpointSaver> CheckpointSaver for BufferedCheckpointSaver<S> {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        // Buffered writes are not yet visible to the inner saver; check the
        // buffer first so a read-after-write within the same tick is coherent.
        let buffer = self.buffer.lock().await;
        if let Some(thread_id) = &config.thread_id {
            if let Some(pending) = buffer
                .iter()
                .rev()
                .find(|p| p.config.thread_id.as_deref() == Some(thread_id.as_str()))
            {
                return Ok(Some(CheckpointTuple::new(
                    CheckpointConfig {
                        thread_id: Some(thread_id.clone()),
                        checkpoint_id: Some(pending.checkpoint.id.clone()),
                        checkpoint_ns: pending.config.checkpoint_ns.clone(),
                        extra: HashMap::new(),
                    },
                    pending.checkpoint.clone(),
                    pending.metadata.clone(),
                )));
            }
        }
        drop(buffer);
        self.inner.get_tuple(config).await
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        self.inner.list(config, filter, before, limit).await
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let resolved = CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_id: Some(checkpoint.id.clone()),
            checkpoint_ns: config.checkpoint_ns.clone(),
            extra: config.extra.clone(),
        };

        self.buffer.lock().await.push(PendingPut {
            config: config.clone(),
            checkpoint,
            metadata,
        });

        if self.should_flush().await {
            self.flush().await?;
        }

        Ok(resolved)
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()> {
        self.flush().await?;
        self.inner.put_writes(config, writes, task_id).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.buffer
            .lock()
            .await
            .retain(|p| p.config.thread_id.as_deref() != Some(thread_id));
        self.inner.delete_thread(thread_id).await
    }
}
