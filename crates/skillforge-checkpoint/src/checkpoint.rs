//! Core checkpoint data structures for durable run state.
//!
//! A [`Checkpoint`] is a complete snapshot of a run's state: the shared
//! key-value data store, which skill (if any) is next up, the append-only
//! history of step descriptions, and the run's status. Checkpoints are
//! identified by `(thread_id, checkpoint_ns, checkpoint_id)` and ordered by
//! `ts`; the newest checkpoint for a thread is the thread's authoritative
//! state.
//!
//! # Identity and ordering
//!
//! `checkpoint_ns` is the empty string by convention — it exists to let a
//! future nested-subgraph feature shard a thread's checkpoints into
//! namespaces without changing the storage key shape. `checkpoint_id` is
//! unique and monotonically increasing in time within a thread; chain
//! integrity is enforced via `parent_checkpoint_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Checkpoint ID type.
pub type CheckpointId = String;

/// Sentinel stored in `active_skill` once planning has chosen to stop.
pub const END_SENTINEL: &str = "END";

/// Run status, mirrored onto the denormalized checkpoint-row projection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Error,
}

/// Pending write tuple: `(task_id, channel, value)`.
///
/// Tracks a write that a concurrently-running `parallel` pipeline branch has
/// staged but not yet merged into the shared data store.
pub type PendingWrite = (String, String, serde_json::Value);

/// Metadata source: how this checkpoint came to exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// The initial checkpoint created when a run is started.
    Input,
    /// Created after a planner/executor superstep.
    Loop,
    /// Created by an external actor updating state directly (HITL, rerun).
    Update,
    /// Created as a copy of another checkpoint (rerun from a prior thread).
    Fork,
}

/// Metadata attached to a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Superstep number; -1 for the input checkpoint, 0.. for loop checkpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Parent checkpoint id within this thread (namespace -> id), `""` = direct parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<HashMap<String, String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_parents(mut self, parents: HashMap<String, String>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub fn with_extra(mut self, key: String, value: serde_json::Value) -> Self {
        self.extra.insert(key, value);
        self
    }
}

/// A complete run-state snapshot.
///
/// `channel_values` always carries the four well-known keys a run state is
/// made of: `data_store`, `active_skill`, `history`, `status`. They are kept
/// as a generic map (rather than dedicated struct fields) so a
/// [`CheckpointSaver`](crate::traits::CheckpointSaver) backend never has to
/// know the shape of what it's storing — only the orchestrator crate above
/// this one interprets these keys, via [`RunState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub v: i32,
    pub id: CheckpointId,
    pub ts: DateTime<Utc>,
    pub channel_values: HashMap<String, serde_json::Value>,
    /// Pending writes staged by in-flight `parallel` branches, not yet merged.
    pub pending_writes: Vec<PendingWrite>,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(id: CheckpointId, channel_values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values,
            pending_writes: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            channel_values: HashMap::new(),
            pending_writes: Vec::new(),
        }
    }

    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }
}

/// Typed view over a [`Checkpoint`]'s `channel_values`.
///
/// Skills may not write keys beginning with `_`; those are reserved for
/// engine-internal bookkeeping (`_status`, `_error`, `_failed_skill`,
/// `_pending_callback`, …) and live inside `data_store` itself rather than
/// as separate `RunState` fields, per the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub data_store: serde_json::Value,
    /// `None` before planning has chosen a skill; `Some("END")` once stopped.
    pub active_skill: Option<String>,
    pub history: Vec<String>,
    pub status: RunStatus,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            data_store: serde_json::json!({}),
            active_skill: None,
            history: Vec::new(),
            status: RunStatus::Pending,
        }
    }

    pub fn is_end(&self) -> bool {
        self.active_skill.as_deref() == Some(END_SENTINEL)
    }

    pub fn into_channel_values(self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("data_store".to_string(), self.data_store);
        map.insert(
            "active_skill".to_string(),
            self.active_skill
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        );
        map.insert("history".to_string(), serde_json::json!(self.history));
        map.insert(
            "status".to_string(),
            serde_json::to_value(self.status).expect("RunStatus always serializes"),
        );
        map
    }

    pub fn from_channel_values(
        map: &HashMap<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let data_store = map.get("data_store").cloned().unwrap_or(serde_json::json!({}));
        let active_skill = map
            .get("active_skill")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let history = map
            .get("history")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let status = map
            .get("status")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or(RunStatus::Pending);
        Ok(Self {
            data_store,
            active_skill,
            history,
            status,
        })
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies a run/thread and (optionally) a specific checkpoint within it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Empty string by convention; reserved for future subgraph namespacing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_id(mut self, thread_id: String) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: CheckpointId) -> Self {
        self.checkpoint_id = Some(checkpoint_id);
        self
    }

    pub fn with_checkpoint_ns(mut self, checkpoint_ns: String) -> Self {
        self.checkpoint_ns = Some(checkpoint_ns);
        self
    }
}

/// A checkpoint bundled with its identifying config, metadata, and parent link.
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    pub config: CheckpointConfig,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
    pub parent_config: Option<CheckpointConfig>,
}

impl CheckpointTuple {
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
        }
    }

    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_checkpoint_has_no_channel_values() {
        let checkpoint = Checkpoint::empty();
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert!(checkpoint.channel_values.is_empty());
        assert!(checkpoint.pending_writes.is_empty());
    }

    #[test]
    fn run_state_round_trips_through_channel_values() {
        let mut state = RunState::new();
        state.data_store = serde_json::json!({"x": 1});
        state.active_skill = Some("SkillB".to_string());
        state.history.push("Planner chose SkillB".to_string());
        state.status = RunStatus::Running;

        let map = state.clone().into_channel_values();
        let restored = RunState::from_channel_values(&map).unwrap();

        assert_eq!(restored.data_store, state.data_store);
        assert_eq!(restored.active_skill, state.active_skill);
        assert_eq!(restored.history, state.history);
        assert_eq!(restored.status, state.status);
    }

    #[test]
    fn end_sentinel_is_detected() {
        let mut state = RunState::new();
        state.active_skill = Some(END_SENTINEL.to_string());
        assert!(state.is_end());
    }

    #[test]
    fn checkpoint_config_builder() {
        let config = CheckpointConfig::new()
            .with_thread_id("thread-1".to_string())
            .with_checkpoint_id("checkpoint-1".to_string());

        assert_eq!(config.thread_id, Some("thread-1".to_string()));
        assert_eq!(config.checkpoint_id, Some("checkpoint-1".to_string()));
    }
}
