//! The action executor (C7): dispatches by `action.type` to one of the
//! synchronous sub-handlers below. Every sub-handler runs under its own
//! `timeout_ms`; any failure (timeout included) is fatal for the skill with
//! kind `action_error`.

pub mod data_query;
pub mod http_call;
pub mod python_function;
pub mod script;

use crate::context::ExecutionContext;
use crate::executor::{Executor, ExecutorOutcome};
use crate::pipeline::PipelineEngine;
use async_trait::async_trait;
use serde_json::Value;
use skillforge_core::{ActionConfig, EngineError, ExecutorErrorKind, Result, Skill};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub use data_query::{DataConnector, DataQueryHandler};
pub use http_call::HttpCallHandler;
pub use python_function::{FunctionTable, PythonFunctionHandler};
pub use script::ScriptHandler;

pub struct ActionExecutor {
    python_function: PythonFunctionHandler,
    data_query: Arc<DataQueryHandler>,
    http_call: HttpCallHandler,
    script: ScriptHandler,
    /// Built by [`crate::build::build_executor_dispatch`] from the same
    /// `Arc<DataQueryHandler>` handed to the pipeline engine, so a bare
    /// `data_query` action and a pipeline's `query` step share one connector
    /// set.
    pipeline_engine: Arc<PipelineEngine>,
}

impl ActionExecutor {
    pub fn new(
        python_function: PythonFunctionHandler,
        data_query: Arc<DataQueryHandler>,
        http_call: HttpCallHandler,
        script: ScriptHandler,
        pipeline_engine: Arc<PipelineEngine>,
    ) -> Self {
        Self {
            python_function,
            data_query,
            http_call,
            script,
            pipeline_engine,
        }
    }
}

#[async_trait]
impl Executor for ActionExecutor {
    async fn execute(&self, skill: &Skill, resolved_inputs: BTreeMap<String, Value>, ctx: &ExecutionContext) -> Result<ExecutorOutcome> {
        let config = skill.action_config.as_ref().ok_or_else(|| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::PipelineStepFailed,
            message: "action executor invoked without action_config".to_string(),
        })?;

        let timeout = config.timeout_ms().map(Duration::from_millis);

        let outputs = match config {
            ActionConfig::PythonFunction { .. } => with_timeout(skill, timeout, self.python_function.run(skill, config, &resolved_inputs, ctx)).await?,
            ActionConfig::DataQuery { .. } => with_timeout(skill, timeout, self.data_query.run(skill, config, &resolved_inputs, ctx)).await?,
            ActionConfig::HttpCall { .. } => with_timeout(skill, timeout, self.http_call.run(skill, config, &resolved_inputs)).await?,
            ActionConfig::Script { .. } => with_timeout(skill, timeout, self.script.run(skill, config, &resolved_inputs)).await?,
            ActionConfig::DataPipeline { pipeline } => self.pipeline_engine.run(skill, pipeline, resolved_inputs, ctx).await?,
        };

        Ok(ExecutorOutcome::new(outputs))
    }
}

async fn with_timeout<F>(skill: &Skill, timeout: Option<Duration>, fut: F) -> Result<Value>
where
    F: std::future::Future<Output = Result<Value>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
            Err(EngineError::Executor {
                skill: skill.name.clone(),
                kind: ExecutorErrorKind::PipelineStepFailed,
                message: format!("action timed out after {}ms", timeout.as_millis()),
            })
        }),
        None => fut.await,
    }
}
