//! Bounded exponential backoff around checkpoint durability (§7: "Checkpoint
//! flush errors do NOT lose history in memory; the engine retries with
//! exponential backoff up to a bounded limit, then marks the run `error`
//! with `checkpoint_flush_error`"). Scoped to that one boundary only — skill
//! and executor failures are never retried here; a failed run is retried by
//! an explicit rerun.

use skillforge_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver};
use skillforge_core::{EngineError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CheckpointRetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for CheckpointRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl CheckpointRetryConfig {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32)) as u64;
        let delay_ms = delay_ms.min(self.max_backoff_ms);
        let delay_ms = if self.jitter {
            let jitter_amount = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms + jitter_amount
        } else {
            delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}

/// Durably `put` a checkpoint, retrying transient storage failures up to
/// `retry_config.max_retries` times before giving up. The checkpoint and its
/// in-memory history are never discarded on failure — the caller still has
/// them and decides what to do once this returns `Err`.
pub async fn put_with_retry(
    saver: &dyn CheckpointSaver,
    config: &CheckpointConfig,
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    retry_config: &CheckpointRetryConfig,
) -> Result<CheckpointConfig> {
    let mut last_error = None;

    for attempt in 0..=retry_config.max_retries {
        if attempt > 0 {
            tracing::info!(attempt, max_retries = retry_config.max_retries, "retrying checkpoint flush");
            tokio::time::sleep(retry_config.backoff_delay(attempt - 1)).await;
        }

        match saver.put(config, checkpoint.clone(), metadata.clone()).await {
            Ok(saved) => {
                if attempt > 0 {
                    tracing::info!(attempt, "checkpoint flush succeeded after retry");
                }
                return Ok(saved);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "checkpoint flush attempt failed");
                last_error = Some(e.to_string());
            }
        }
    }

    Err(EngineError::CheckpointFlushError {
        attempts: retry_config.max_retries + 1,
        message: last_error.unwrap_or_else(|| "unknown checkpoint storage failure".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_checkpoint::InMemoryCheckpointSaver;
    use std::collections::HashMap;

    #[tokio::test]
    async fn succeeds_on_the_first_try_against_a_healthy_saver() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new().with_thread_id("t1".to_string());
        let checkpoint = Checkpoint::new("cp-1".to_string(), HashMap::new());
        let retry_config = CheckpointRetryConfig::default();

        let saved = put_with_retry(&saver, &config, checkpoint, CheckpointMetadata::new(), &retry_config).await.unwrap();
        assert_eq!(saved.checkpoint_id, Some("cp-1".to_string()));
    }

    #[tokio::test]
    async fn backoff_delay_grows_with_attempt_number() {
        let retry_config = CheckpointRetryConfig {
            jitter: false,
            ..CheckpointRetryConfig::default()
        };
        assert_eq!(retry_config.backoff_delay(0), Duration::from_millis(200));
        assert_eq!(retry_config.backoff_delay(1), Duration::from_millis(400));
        assert_eq!(retry_config.backoff_delay(2), Duration::from_millis(800));
    }

    #[test]
    fn backoff_delay_is_capped_at_max_backoff_ms() {
        let retry_config = CheckpointRetryConfig {
            jitter: false,
            max_backoff_ms: 1_000,
            ..CheckpointRetryConfig::default()
        };
        assert_eq!(retry_config.backoff_delay(10), Duration::from_millis(1_000));
    }

    struct AlwaysFailsSaver;

    #[async_trait::async_trait]
    impl CheckpointSaver for AlwaysFailsSaver {
        async fn get_tuple(&self, _config: &CheckpointConfig) -> skillforge_checkpoint::Result<Option<skillforge_checkpoint::CheckpointTuple>> {
            Ok(None)
        }
        async fn list(
            &self,
            _config: Option<&CheckpointConfig>,
            _filter: Option<HashMap<String, serde_json::Value>>,
            _before: Option<&CheckpointConfig>,
            _limit: Option<usize>,
        ) -> skillforge_checkpoint::Result<skillforge_checkpoint::CheckpointStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
        async fn put(&self, _config: &CheckpointConfig, _checkpoint: Checkpoint, _metadata: CheckpointMetadata) -> skillforge_checkpoint::Result<CheckpointConfig> {
            Err(skillforge_checkpoint::CheckpointError::Storage("disk full".to_string()))
        }
        async fn put_writes(&self, _config: &CheckpointConfig, _writes: Vec<(String, serde_json::Value)>, _task_id: String) -> skillforge_checkpoint::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn exhausting_retries_against_a_failing_saver_yields_checkpoint_flush_error() {
        let saver = AlwaysFailsSaver;
        let config = CheckpointConfig::new().with_thread_id("t1".to_string());
        let checkpoint = Checkpoint::new("cp-1".to_string(), HashMap::new());
        let retry_config = CheckpointRetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            jitter: false,
            ..CheckpointRetryConfig::default()
        };

        let err = put_with_retry(&saver, &config, checkpoint, CheckpointMetadata::new(), &retry_config).await.unwrap_err();
        assert_eq!(err.kind(), "checkpoint_flush_error");
        match err {
            EngineError::CheckpointFlushError { attempts, .. } => assert_eq!(attempts, 3),
            _ => panic!("expected CheckpointFlushError"),
        }
    }
}
