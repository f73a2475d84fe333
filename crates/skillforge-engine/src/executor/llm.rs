//! The LLM executor (C5): renders a skill's `prompt`/`system_prompt` against
//! the run's data store, asks a [`ChatModel`] for a structured reply shaped
//! like the skill's `produces`/`optional_produces`, and hands the decoded
//! object back as `outputs` for the common output-mapping step to project.

use crate::context::ExecutionContext;
use crate::executor::{Executor, ExecutorOutcome};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use skillforge_core::{path, EngineError, ExecutorErrorKind, Result, Skill};
use skillforge_llm::{build_output_schema, ChatModel, ChatRequest, Message};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

static TEMPLATE_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("valid regex"));

/// Substitutes every `{dotted.path}` in `template` with the value at that
/// path in `data_store`. Scalars render as their plain text; objects and
/// arrays render as compact JSON. A path that resolves to nothing is left as
/// an empty string rather than failing the whole render — prompt templates
/// commonly reference optional context.
pub fn render_template(template: &str, data_store: &Value) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &regex::Captures| {
            let resolved = path::get(data_store, &caps[1]);
            match resolved {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Resolves which [`ChatModel`] a given run should talk to: an explicit
/// per-run override takes precedence over the engine's configured default.
pub struct LlmExecutor {
    default_model: Arc<dyn ChatModel>,
    models: BTreeMap<String, Arc<dyn ChatModel>>,
    default_temperature: Option<f32>,
}

impl LlmExecutor {
    pub fn new(default_model: Arc<dyn ChatModel>) -> Self {
        Self {
            default_model,
            models: BTreeMap::new(),
            default_temperature: None,
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    fn model_for(&self, ctx: &ExecutionContext) -> &Arc<dyn ChatModel> {
        ctx.llm_model_override
            .as_ref()
            .and_then(|name| self.models.get(name))
            .unwrap_or(&self.default_model)
    }
}

#[async_trait]
impl Executor for LlmExecutor {
    async fn execute(&self, skill: &Skill, resolved_inputs: BTreeMap<String, Value>, ctx: &ExecutionContext) -> Result<ExecutorOutcome> {
        let data_store = Value::Object(resolved_inputs.into_iter().collect());

        let prompt = skill
            .prompt
            .as_ref()
            .map(|p| render_template(p, &data_store))
            .unwrap_or_default();
        let system_prompt = skill.system_prompt.as_ref().map(|p| render_template(p, &data_store));

        let mut messages = Vec::new();
        if let Some(system_prompt) = system_prompt {
            messages.push(Message::system(system_prompt));
        }
        messages.push(Message::human(prompt));

        let schema = build_output_schema(
            skill.produces.iter().map(String::as_str),
            skill.optional_produces.iter().map(String::as_str),
        );

        let mut request = ChatRequest::new(messages).with_output_schema(schema);
        if let Some(temperature) = self.default_temperature {
            request = request.with_temperature(temperature);
        }

        let model = self.model_for(ctx);
        let response = model.chat(request).await.map_err(|e| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::LlmOutputInvalid,
            message: e.to_string(),
        })?;

        let outputs: Value = serde_json::from_str(response.text()).map_err(|e| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::LlmOutputInvalid,
            message: format!("model reply was not valid JSON: {e}"),
        })?;

        Ok(ExecutorOutcome::new(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillforge_core::StaticCredentialClient;
    use skillforge_llm::MockChatModel;
    use std::collections::BTreeSet;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("t1", "owner-1", Arc::new(StaticCredentialClient::new()))
    }

    fn skill() -> Skill {
        Skill {
            name: "summarize".to_string(),
            description: "d".to_string(),
            requires: BTreeSet::from(["document.text".to_string()]),
            produces: BTreeSet::from(["document.summary".to_string()]),
            optional_produces: BTreeSet::new(),
            executor: skillforge_core::ExecutorKind::Llm,
            hitl_enabled: false,
            prompt: Some("Summarize: {document.text}".to_string()),
            system_prompt: Some("You are terse.".to_string()),
            rest_config: None,
            action_config: None,
            version: 1,
            tags: vec![],
            source: None,
        }
    }

    #[test]
    fn render_template_substitutes_nested_paths_and_stringifies_objects() {
        let data = json!({"customer": {"id": "c1", "meta": {"vip": true}}});
        assert_eq!(render_template("id={customer.id}", &data), "id=c1");
        assert_eq!(render_template("meta={customer.meta}", &data), r#"meta={"vip":true}"#);
        assert_eq!(render_template("missing={nope.here}", &data), "missing=");
    }

    #[tokio::test]
    async fn execute_decodes_the_model_reply_as_json_outputs() {
        let model = Arc::new(MockChatModel::with_json(json!({"document": {"summary": "short"}})));
        let executor = LlmExecutor::new(model);
        let inputs = BTreeMap::from([("document".to_string(), json!({"text": "long text"}))]);
        let outcome = executor.execute(&skill(), inputs, &ctx()).await.unwrap();
        assert_eq!(outcome.outputs, json!({"document": {"summary": "short"}}));
    }

    #[tokio::test]
    async fn non_json_reply_is_a_fatal_llm_output_invalid_error() {
        let model = Arc::new(MockChatModel::new("not json"));
        let executor = LlmExecutor::new(model);
        let err = executor.execute(&skill(), BTreeMap::new(), &ctx()).await.unwrap_err();
        assert_eq!(err.kind(), "executor_error");
    }

    #[tokio::test]
    async fn llm_model_override_selects_a_registered_model_over_the_default() {
        let default_model = Arc::new(MockChatModel::with_json(json!({"document": {"summary": "default"}})));
        let override_model = Arc::new(MockChatModel::with_json(json!({"document": {"summary": "overridden"}})));
        let executor = LlmExecutor::new(default_model).with_model("special", override_model);
        let ctx = ctx().with_llm_model_override("special");
        let outcome = executor.execute(&skill(), BTreeMap::new(), &ctx).await.unwrap();
        assert_eq!(outcome.outputs["document"]["summary"], json!("overridden"));
    }
}
