//! The shared error taxonomy: every failure a skill execution or a run can
//! produce, named so the orchestrator can record `_error.kind` on a run's
//! data store exactly the way a failed run is expected to explain itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The inner classification for an [`EngineError::Executor`] failure —
/// distinguishes *why* an executor failed, since "executor_error" alone
/// isn't enough to decide whether a retry is worth attempting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorErrorKind {
    LlmOutputInvalid,
    DbQueryFailed,
    SubprocessNonzero,
    HttpNon2xx,
    PipelineStepFailed,
    CredentialNotFound,
    UnknownOperator,
}

impl std::fmt::Display for ExecutorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutorErrorKind::LlmOutputInvalid => "llm_output_invalid",
            ExecutorErrorKind::DbQueryFailed => "db_query_failed",
            ExecutorErrorKind::SubprocessNonzero => "subprocess_nonzero",
            ExecutorErrorKind::HttpNon2xx => "http_non_2xx",
            ExecutorErrorKind::PipelineStepFailed => "pipeline_step_failed",
            ExecutorErrorKind::CredentialNotFound => "credential_not_found",
            ExecutorErrorKind::UnknownOperator => "unknown_operator",
        };
        f.write_str(s)
    }
}

/// The full error taxonomy a run can fail with. `kind()` gives the stable
/// string an orchestrator records as `_error.kind` in a run's data store;
/// the `Display` impl gives a human-readable message for logs.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("skill '{skill}' is missing required input '{path}'")]
    MissingRequiredInput { skill: String, path: String },

    #[error("skill '{skill}' did not produce required output '{path}'")]
    MissingRequiredOutput { skill: String, path: String },

    #[error("skill '{skill}' returned a non-object result")]
    NonDictResult { skill: String },

    #[error("skill '{skill}' executor failed ({kind}): {message}")]
    Executor {
        skill: String,
        kind: ExecutorErrorKind,
        message: String,
    },

    #[error("REST callback for skill '{skill}' timed out waiting for thread '{thread_id}'")]
    RestTimeout { skill: String, thread_id: String },

    #[error("planner could not choose a next skill: {0}")]
    PlannerNoChoice(String),

    #[error("run '{thread_id}' was cancelled")]
    Cancelled { thread_id: String },

    #[error("checkpoint flush failed after {attempts} attempt(s): {message}")]
    CheckpointFlushError { attempts: u32, message: String },
}

impl EngineError {
    /// The stable `_error.kind` string recorded against a failed run.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::MissingRequiredInput { .. } => "missing_required_input",
            EngineError::MissingRequiredOutput { .. } => "missing_required_output",
            EngineError::NonDictResult { .. } => "non_dict_result",
            EngineError::Executor { .. } => "executor_error",
            EngineError::RestTimeout { .. } => "rest_timeout",
            EngineError::PlannerNoChoice(_) => "planner_no_choice",
            EngineError::Cancelled { .. } => "cancelled",
            EngineError::CheckpointFlushError { .. } => "checkpoint_flush_error",
        }
    }

    /// The name of the skill that failed, when the error is skill-scoped.
    pub fn failed_skill(&self) -> Option<&str> {
        match self {
            EngineError::MissingRequiredInput { skill, .. }
            | EngineError::MissingRequiredOutput { skill, .. }
            | EngineError::NonDictResult { skill }
            | EngineError::Executor { skill, .. }
            | EngineError::RestTimeout { skill, .. } => Some(skill),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_the_taxonomy() {
        assert_eq!(
            EngineError::MissingRequiredInput {
                skill: "s".to_string(),
                path: "p".to_string()
            }
            .kind(),
            "missing_required_input"
        );
        assert_eq!(
            EngineError::Executor {
                skill: "s".to_string(),
                kind: ExecutorErrorKind::HttpNon2xx,
                message: "502".to_string(),
            }
            .kind(),
            "executor_error"
        );
    }

    #[test]
    fn failed_skill_is_none_for_run_scoped_errors() {
        assert_eq!(
            EngineError::PlannerNoChoice("no eligible skills".to_string()).failed_skill(),
            None
        );
        assert_eq!(
            EngineError::Cancelled {
                thread_id: "t1".to_string()
            }
            .failed_skill(),
            None
        );
    }

    #[test]
    fn executor_error_kind_display_is_snake_case() {
        assert_eq!(
            ExecutorErrorKind::CredentialNotFound.to_string(),
            "credential_not_found"
        );
    }
}
