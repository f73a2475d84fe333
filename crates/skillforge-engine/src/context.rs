//! The per-call execution context (C4): everything an executor needs about
//! *who* is running a skill, as opposed to *what* the skill is.

use skillforge_core::CredentialClient;
use std::sync::Arc;

/// Carried into every [`crate::executor::Executor::execute`] call. Holds the
/// identity and override knobs a skill's own manifest never specifies,
/// because they belong to the run, not the skill.
#[derive(Clone)]
pub struct ExecutionContext {
    pub thread_id: String,
    pub owner_id: String,
    pub workspace_id: Option<String>,
    /// Takes precedence over the engine's process-wide default model,
    /// fixed for the lifetime of a run at start time.
    pub llm_model_override: Option<String>,
    pub credential_client: Arc<dyn CredentialClient>,
}

impl ExecutionContext {
    pub fn new(
        thread_id: impl Into<String>,
        owner_id: impl Into<String>,
        credential_client: Arc<dyn CredentialClient>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            owner_id: owner_id.into(),
            workspace_id: None,
            llm_model_override: None,
            credential_client,
        }
    }

    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_llm_model_override(mut self, model: impl Into<String>) -> Self {
        self.llm_model_override = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_core::StaticCredentialClient;

    #[test]
    fn builder_sets_optional_fields() {
        let ctx = ExecutionContext::new("t1", "owner-1", Arc::new(StaticCredentialClient::new()))
            .with_workspace_id("ws-1")
            .with_llm_model_override("gpt-5");
        assert_eq!(ctx.workspace_id, Some("ws-1".to_string()));
        assert_eq!(ctx.llm_model_override, Some("gpt-5".to_string()));
    }
}
