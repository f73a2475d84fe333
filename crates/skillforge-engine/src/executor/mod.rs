//! The executor contract (C4): every executor kind — LLM, REST, action —
//! speaks the same `execute` signature and the same output-mapping rules.
//! Only what happens *inside* `execute` differs per kind.

pub mod action;
pub mod llm;
pub mod rest;

use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde_json::Value;
use skillforge_core::{EngineError, ExecutorKind, Result, Skill};
use std::collections::BTreeMap;

/// What an executor handed back before output mapping is applied.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOutcome {
    pub outputs: Value,
    pub side_effects: Option<SideEffects>,
}

impl ExecutorOutcome {
    pub fn new(outputs: Value) -> Self {
        Self {
            outputs,
            side_effects: None,
        }
    }

    pub fn paused(callback_token: impl Into<String>) -> Self {
        Self {
            outputs: Value::Object(Default::default()),
            side_effects: Some(SideEffects {
                pause: true,
                callback_token: Some(callback_token.into()),
            }),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.side_effects.as_ref().is_some_and(|s| s.pause)
    }
}

#[derive(Debug, Clone)]
pub struct SideEffects {
    pub pause: bool,
    pub callback_token: Option<String>,
}

/// The contract every skill executor implements. `resolved_inputs` is keyed
/// exactly by the skill's `requires` paths, pre-resolved by the path
/// resolver before the executor ever sees them.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        skill: &Skill,
        resolved_inputs: BTreeMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<ExecutorOutcome>;
}

/// Dispatches a skill to the concrete executor matching its `executor` kind,
/// then applies the output-mapping algorithm common to all of them.
pub struct ExecutorDispatch {
    pub llm: llm::LlmExecutor,
    pub rest: rest::RestExecutor,
    pub action: action::ActionExecutor,
}

impl ExecutorDispatch {
    pub fn new(llm: llm::LlmExecutor, rest: rest::RestExecutor, action: action::ActionExecutor) -> Self {
        Self { llm, rest, action }
    }

    /// Run a skill to completion (or pause) and return its output mapping
    /// applied. Callers that need the raw outcome before mapping (to detect a
    /// pause without having produced a contribution to the data store) should
    /// call [`Self::execute_raw`] instead.
    pub async fn execute_raw(
        &self,
        skill: &Skill,
        resolved_inputs: BTreeMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<ExecutorOutcome> {
        match skill.executor {
            ExecutorKind::Llm => self.llm.execute(skill, resolved_inputs, ctx).await,
            ExecutorKind::Rest => self.rest.execute(skill, resolved_inputs, ctx).await,
            ExecutorKind::Action => self.action.execute(skill, resolved_inputs, ctx).await,
        }
    }
}

/// Build the `resolved_inputs` map an executor receives for a set of
/// `requires` paths, preserving nested structure rather than flattening each
/// path into a literal key. `render_template` and every executor that
/// templates against `resolved_inputs` call [`skillforge_core::path::get`]
/// against it, which traverses dotted segments (`"customer.id"` looks for
/// key `customer` containing key `id`) — a flat `{"customer.id": value}`
/// map would never match that traversal, so this writes each resolved value
/// back through [`skillforge_core::path::set`] to reconstruct the same
/// nesting `path::get` expects to read.
///
/// Returns the first `requires` path that has no value in `data_store`, as
/// a plain `String`, so each caller can wrap it in its own error type.
pub fn resolve_requires<'a>(data_store: &Value, requires: impl IntoIterator<Item = &'a String>) -> std::result::Result<BTreeMap<String, Value>, String> {
    let mut root = Value::Object(serde_json::Map::new());
    for required in requires {
        let value = skillforge_core::path::get(data_store, required).ok_or_else(|| required.clone())?;
        skillforge_core::path::set(&mut root, required, value.clone()).map_err(|e| format!("failed to resolve '{required}': {e}"))?;
    }
    match root {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => unreachable!("root is always constructed as an object"),
    }
}

/// Project an executor's raw `outputs` onto the skill's `produces`/
/// `optional_produces` contract (C4 output mapping).
///
/// `is_data_pipeline` distinguishes the one case where a single-`produces`
/// ACTION skill does *not* get the implicit wrap behavior: a `data_pipeline`
/// action always key-extracts, even with exactly one produced path.
pub fn project_outputs(skill: &Skill, is_data_pipeline: bool, outputs: Value) -> Result<BTreeMap<String, Value>> {
    let Value::Object(outputs) = outputs else {
        return Err(EngineError::NonDictResult {
            skill: skill.name.clone(),
        });
    };

    let wrap = skill.executor == ExecutorKind::Action && !is_data_pipeline && skill.produces.len() == 1;

    let mut mapped = BTreeMap::new();
    if wrap {
        let key = skill.produces.iter().next().expect("len == 1").clone();
        mapped.insert(key, Value::Object(outputs.clone()));
    } else if skill.produces.is_empty() {
        for (key, value) in &outputs {
            mapped.insert(key.clone(), value.clone());
        }
    } else {
        for key in &skill.produces {
            match outputs.get(key) {
                Some(value) => {
                    mapped.insert(key.clone(), value.clone());
                }
                None => {
                    return Err(EngineError::MissingRequiredOutput {
                        skill: skill.name.clone(),
                        path: key.clone(),
                    })
                }
            }
        }
    }

    for key in &skill.optional_produces {
        if mapped.contains_key(key) {
            continue;
        }
        if let Some(value) = outputs.get(key) {
            if !value.is_null() {
                mapped.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(mapped)
}

/// Run a single skill to completion: dispatch to its executor, then apply
/// its output mapping. Shared by the main run loop and the pipeline engine's
/// `skill` step, so a skill invoked from inside a `data_pipeline` goes
/// through exactly the same path a top-level step would.
///
/// `resolved_inputs` must already satisfy `skill.requires` — callers resolve
/// those paths against whatever data store they're working from (the run's
/// durable store, or a pipeline's local scratch) before calling this.
pub async fn run_skill(
    skill: &Skill,
    resolved_inputs: BTreeMap<String, Value>,
    dispatch: &ExecutorDispatch,
    ctx: &ExecutionContext,
) -> Result<(BTreeMap<String, Value>, Option<SideEffects>)> {
    let outcome = dispatch.execute_raw(skill, resolved_inputs, ctx).await?;
    if outcome.is_paused() {
        return Ok((BTreeMap::new(), outcome.side_effects));
    }

    let is_data_pipeline = matches!(skill.action_config, Some(skillforge_core::ActionConfig::DataPipeline { .. }));
    let mapped = project_outputs(skill, is_data_pipeline, outcome.outputs)?;
    Ok((mapped, None))
}
