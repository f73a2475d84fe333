//! The `python_function` action sub-handler (§4.6.1): invokes a named
//! function from a process-local table populated at engine init from
//! trusted code. Despite the name (carried over from the system this engine
//! coordinates skills for), nothing here evaluates untrusted code — a
//! function must already be registered to be callable.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde_json::Value;
use skillforge_core::{ActionConfig, EngineError, ExecutorErrorKind, Result, Skill};
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
pub trait SkillFunction: Send + Sync {
    async fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &ExecutionContext) -> anyhow::Result<Value>;
}

/// A registered function table, keyed by the name a skill's `function` field
/// (and a pipeline's `transform` steps) reference.
#[derive(Default, Clone)]
pub struct FunctionTable {
    functions: std::collections::BTreeMap<String, Arc<dyn SkillFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, name: impl Into<String>, function: Arc<dyn SkillFunction>) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SkillFunction>> {
        self.functions.get(name)
    }
}

pub struct PythonFunctionHandler {
    table: FunctionTable,
}

impl PythonFunctionHandler {
    pub fn new(table: FunctionTable) -> Self {
        Self { table }
    }

    pub async fn run(
        &self,
        skill: &Skill,
        config: &ActionConfig,
        resolved_inputs: &BTreeMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let ActionConfig::PythonFunction { function, .. } = config else {
            unreachable!("dispatched only for python_function configs")
        };

        let handler = self.table.get(function).ok_or_else(|| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::SubprocessNonzero,
            message: format!("no function registered under name '{function}'"),
        })?;

        handler.call(resolved_inputs, ctx).await.map_err(|e| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::SubprocessNonzero,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillforge_core::StaticCredentialClient;
    use std::collections::BTreeSet;

    struct Echo;

    #[async_trait]
    impl SkillFunction for Echo {
        async fn call(&self, inputs: &BTreeMap<String, Value>, _ctx: &ExecutionContext) -> anyhow::Result<Value> {
            Ok(Value::Object(inputs.clone().into_iter().collect()))
        }
    }

    fn skill() -> Skill {
        Skill {
            name: "echo".to_string(),
            description: "d".to_string(),
            requires: BTreeSet::new(),
            produces: BTreeSet::from(["result".to_string()]),
            optional_produces: BTreeSet::new(),
            executor: skillforge_core::ExecutorKind::Action,
            hitl_enabled: false,
            prompt: None,
            system_prompt: None,
            rest_config: None,
            action_config: Some(ActionConfig::PythonFunction {
                function: "echo".to_string(),
                module: None,
                timeout_ms: 5000,
            }),
            version: 1,
            tags: vec![],
            source: None,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("t1", "owner-1", Arc::new(StaticCredentialClient::new()))
    }

    #[tokio::test]
    async fn invokes_the_registered_function_by_name() {
        let table = FunctionTable::new().with_function("echo", Arc::new(Echo));
        let handler = PythonFunctionHandler::new(table);
        let inputs = BTreeMap::from([("x".to_string(), json!(1))]);
        let out = handler.run(&skill(), skill().action_config.as_ref().unwrap(), &inputs, &ctx()).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
    }

    #[tokio::test]
    async fn unregistered_function_is_a_fatal_error() {
        let handler = PythonFunctionHandler::new(FunctionTable::new());
        let err = handler
            .run(&skill(), skill().action_config.as_ref().unwrap(), &BTreeMap::new(), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "executor_error");
    }
}
