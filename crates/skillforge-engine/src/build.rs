//! Assembles the engine's executor graph. A `data_pipeline` action needs to
//! recursively invoke arbitrary skills through the full [`ExecutorDispatch`]
//! (not just the action executor it's running inside of), so the pipeline
//! engine holds a [`Weak`] back-reference to the dispatch it's part of.
//! [`Arc::new_cyclic`] is the only way to hand that reference out before the
//! `Arc<ExecutorDispatch>` it points at exists.

use crate::executor::action::{ActionExecutor, DataQueryHandler, FunctionTable, HttpCallHandler, PythonFunctionHandler, ScriptHandler};
use crate::executor::llm::LlmExecutor;
use crate::executor::rest::RestExecutor;
use crate::executor::ExecutorDispatch;
use crate::pipeline::PipelineEngine;
use skillforge_core::SkillRegistry;
use std::sync::Arc;

/// Everything needed to build the engine's executor graph, handed in from
/// whatever wires up the engine (a CLI, a service entrypoint, a test).
pub struct ExecutorDispatchParts {
    pub llm: LlmExecutor,
    pub rest: RestExecutor,
    pub python_function: PythonFunctionHandler,
    pub data_query: Arc<DataQueryHandler>,
    pub http_call: HttpCallHandler,
    pub script: ScriptHandler,
    pub function_table: Arc<FunctionTable>,
    pub registry: Arc<SkillRegistry>,
}

/// Build the engine's full executor dispatch, wiring the pipeline engine's
/// back-reference through [`Arc::new_cyclic`] so the cycle never needs an
/// owning strong reference on either side.
pub fn build_executor_dispatch(parts: ExecutorDispatchParts) -> Arc<ExecutorDispatch> {
    Arc::new_cyclic(|weak_dispatch| {
        let pipeline_engine = Arc::new(PipelineEngine::new(
            parts.registry,
            weak_dispatch.clone(),
            parts.data_query.clone(),
            parts.function_table,
        ));

        let action = ActionExecutor::new(
            parts.python_function,
            parts.data_query.clone(),
            parts.http_call,
            parts.script,
            pipeline_engine,
        );

        ExecutorDispatch::new(parts.llm, parts.rest, action)
    })
}
