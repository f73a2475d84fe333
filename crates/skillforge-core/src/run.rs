//! The run/thread data model: what a caller starts, what the orchestrator
//! advances, and what a paused REST skill waits on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Error,
}

/// A run request, as submitted by a caller: the standard operating
/// procedure to follow, the data to seed the run with, and enough owner/
/// workspace context to scope visibility and skill resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub thread_id: String,
    pub run_name: String,
    pub sop: String,
    #[serde(default)]
    pub initial_data: serde_json::Value,
    pub status: RunStatus,
    pub owner_id: String,
    #[serde(default)]
    pub parent_thread_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
}

impl Run {
    pub fn new(thread_id: impl Into<String>, run_name: impl Into<String>, sop: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_name: run_name.into(),
            sop: sop.into(),
            initial_data: serde_json::Value::Object(Default::default()),
            status: RunStatus::Pending,
            owner_id: owner_id.into(),
            parent_thread_id: None,
            workspace_id: None,
            llm_model: None,
        }
    }

    /// Build a rerun request: a fresh thread seeded from this run's lineage,
    /// optionally replacing the sop, initial data, or model before
    /// re-entering planning. History is never mutated in place — a rerun is
    /// always a new thread with `parent_thread_id` pointing back here.
    pub fn rerun(
        &self,
        new_thread_id: impl Into<String>,
        sop_override: Option<String>,
        initial_data_override: Option<serde_json::Value>,
        llm_model_override: Option<String>,
    ) -> Self {
        Self {
            thread_id: new_thread_id.into(),
            run_name: self.run_name.clone(),
            sop: sop_override.unwrap_or_else(|| self.sop.clone()),
            initial_data: initial_data_override.unwrap_or_else(|| self.initial_data.clone()),
            status: RunStatus::Pending,
            owner_id: self.owner_id.clone(),
            parent_thread_id: Some(self.thread_id.clone()),
            workspace_id: self.workspace_id.clone(),
            llm_model: llm_model_override.or_else(|| self.llm_model.clone()),
        }
    }
}

/// One entry in a run's immutable step history: which skill ran, with what
/// version, and what it changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub skill_name: String,
    pub skill_version: u32,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub inputs: BTreeMap<String, serde_json::Value>,
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// A pending REST callback: the engine has paused a thread waiting for an
/// external system to call back with a result before `deadline_ts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub thread_id: String,
    pub correlation_token: String,
    pub skill_name: String,
    pub deadline_ts: chrono::DateTime<chrono::Utc>,
}

impl CallbackRecord {
    /// `correlation_token` is this record's idempotency key: a caller
    /// retrying a callback delivery after a successful consumption, or two
    /// callers racing to deliver the same token, must both be safe.
    pub fn idempotency_key(&self) -> &str {
        &self.correlation_token
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.deadline_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerun_points_parent_thread_id_at_the_original() {
        let original = Run::new("t1", "demo", "sop-v1", "user-1");
        let rerun = original.rerun("t2", None, None, None);
        assert_eq!(rerun.parent_thread_id, Some("t1".to_string()));
        assert_eq!(rerun.sop, "sop-v1");
        assert_eq!(rerun.status, RunStatus::Pending);
    }

    #[test]
    fn rerun_overrides_take_precedence_over_lineage() {
        let original = Run::new("t1", "demo", "sop-v1", "user-1");
        let rerun = original.rerun("t2", Some("sop-v2".to_string()), None, Some("gpt-5".to_string()));
        assert_eq!(rerun.sop, "sop-v2");
        assert_eq!(rerun.llm_model, Some("gpt-5".to_string()));
    }

    #[test]
    fn callback_expiry_is_inclusive_of_the_deadline() {
        let deadline = chrono::Utc::now();
        let record = CallbackRecord {
            thread_id: "t1".to_string(),
            correlation_token: "tok".to_string(),
            skill_name: "notify".to_string(),
            deadline_ts: deadline,
        };
        assert!(record.is_expired(deadline));
        assert!(!record.is_expired(deadline - chrono::Duration::seconds(1)));
    }
}
