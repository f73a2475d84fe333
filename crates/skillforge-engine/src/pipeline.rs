//! The data pipeline sub-engine (C8): walks a [`PipelineDef`] against its own
//! local working set, seeded from the `data_pipeline` action's resolved
//! inputs and returned (once the whole pipeline completes) as that action's
//! `outputs`.

use crate::context::ExecutionContext;
use crate::executor::action::{DataQueryHandler, FunctionTable};
use crate::executor::{self, ExecutorDispatch};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use skillforge_core::{
    path, Condition, ConditionOperator, EngineError, ExecutorErrorKind, PipelineDef, PipelineStep, PipelineStepKind,
    PipelineScratch as CoreScratch, Result, Skill, SkillRegistry,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

pub type PipelineScratch = CoreScratch;

/// Drives a [`PipelineDef`]'s steps against an isolated local context.
/// Holds a weak reference to the engine's [`ExecutorDispatch`] (rather than
/// an owning `Arc`) so a `data_pipeline` action and the executor dispatch it
/// lives inside of can reference each other without an ownership cycle.
pub struct PipelineEngine {
    registry: Arc<SkillRegistry>,
    dispatch: Weak<ExecutorDispatch>,
    data_query: Arc<DataQueryHandler>,
    function_table: Arc<FunctionTable>,
}

impl PipelineEngine {
    pub fn new(
        registry: Arc<SkillRegistry>,
        dispatch: Weak<ExecutorDispatch>,
        data_query: Arc<DataQueryHandler>,
        function_table: Arc<FunctionTable>,
    ) -> Self {
        Self {
            registry,
            dispatch,
            data_query,
            function_table,
        }
    }

    /// Run a whole pipeline to completion. `resolved_inputs` seeds the local
    /// context; the returned value is that context flattened back into a
    /// JSON object, ready for the `data_pipeline` action's own output
    /// mapping to key-extract from.
    pub async fn run(
        self: &Arc<Self>,
        skill: &Skill,
        pipeline: &PipelineDef,
        resolved_inputs: BTreeMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let mut scratch: PipelineScratch = resolved_inputs;
        self.run_steps(skill, &pipeline.steps, &mut scratch, ctx).await?;
        Ok(Value::Object(scratch.into_iter().collect()))
    }

    async fn run_steps(self: &Arc<Self>, skill: &Skill, steps: &[PipelineStep], scratch: &mut PipelineScratch, ctx: &ExecutionContext) -> Result<()> {
        for step in steps {
            self.run_step(skill, step, scratch, ctx).await?;
        }
        Ok(())
    }

    fn step_failed(&self, skill: &Skill, step_id: &str, message: impl Into<String>) -> EngineError {
        EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::PipelineStepFailed,
            message: format!("step '{step_id}': {}", message.into()),
        }
    }

    async fn run_step(self: &Arc<Self>, skill: &Skill, step: &PipelineStep, scratch: &mut PipelineScratch, ctx: &ExecutionContext) -> Result<()> {
        if let Some(condition) = &step.run_if {
            if !evaluate_condition(condition, scratch).map_err(|e| self.step_failed(skill, &step.id, e))? {
                return Ok(());
            }
        }
        if let Some(condition) = &step.skip_if {
            if evaluate_condition(condition, scratch).map_err(|e| self.step_failed(skill, &step.id, e))? {
                return Ok(());
            }
        }

        match &step.kind {
            PipelineStepKind::Query {
                connector,
                query,
                credential_ref,
                output,
            } => {
                let action_config = skillforge_core::ActionConfig::DataQuery {
                    connector: connector.clone(),
                    query: query.clone(),
                    credential_ref: credential_ref.clone(),
                    timeout_ms: 30_000,
                };
                let result = self.data_query.run(skill, &action_config, scratch, ctx).await?;
                let key = output.clone().unwrap_or_else(|| step.id.clone());
                scratch.insert(key, result);
            }

            PipelineStepKind::Transform { expression, inputs, output } => {
                let function = self
                    .function_table
                    .get(expression)
                    .ok_or_else(|| self.step_failed(skill, &step.id, format!("no function registered under name '{expression}'")))?;
                let call_inputs: BTreeMap<String, Value> = inputs
                    .iter()
                    .filter_map(|key| scratch.get(key).map(|v| (key.clone(), v.clone())))
                    .collect();
                let result = function
                    .call(&call_inputs, ctx)
                    .await
                    .map_err(|e| self.step_failed(skill, &step.id, e.to_string()))?;
                let key = output.clone().unwrap_or_else(|| step.id.clone());
                scratch.insert(key, result);
            }

            PipelineStepKind::Skill { skill: skill_name } => {
                let nested = self
                    .registry
                    .resolve(skill_name, ctx.workspace_id.as_deref())
                    .await
                    .ok_or_else(|| self.step_failed(skill, &step.id, format!("unknown skill '{skill_name}'")))?;

                let local_context = Value::Object(scratch.clone().into_iter().collect());
                let resolved_inputs = executor::resolve_requires(&local_context, &nested.requires)
                    .map_err(|missing| self.step_failed(skill, &step.id, format!("'{skill_name}' requires missing '{missing}'")))?;

                let dispatch = self.dispatch.upgrade().ok_or_else(|| self.step_failed(skill, &step.id, "executor dispatch no longer available"))?;
                let (mapped, side_effects) = executor::run_skill(&nested, resolved_inputs, &dispatch, ctx).await?;
                if side_effects.is_some() {
                    return Err(self.step_failed(skill, &step.id, format!("'{skill_name}' paused mid-pipeline, which is not supported")));
                }
                for (key, value) in mapped {
                    scratch.insert(key, value);
                }
            }

            PipelineStepKind::Merge { inputs, output } => {
                let mut merged = serde_json::Map::new();
                for input in inputs {
                    if let Some(value) = scratch.get(input) {
                        merged.insert(input.clone(), value.clone());
                    }
                }
                scratch.insert(output.clone(), Value::Object(merged));
            }

            PipelineStepKind::Parallel { steps } => {
                self.run_parallel(skill, steps, scratch, ctx).await?;
            }

            PipelineStepKind::Conditional { condition, then, otherwise } => {
                let branch = evaluate_condition(condition, scratch).map_err(|e| self.step_failed(skill, &step.id, e))?;
                if branch {
                    self.run_steps(skill, then, scratch, ctx).await?;
                } else {
                    self.run_steps(skill, otherwise, scratch, ctx).await?;
                }
            }

            PipelineStepKind::Pipeline { pipeline } => {
                self.run_steps(skill, &pipeline.steps, scratch, ctx).await?;
            }
        }

        Ok(())
    }

    /// Runs `steps` concurrently, each against its own isolated copy of
    /// `scratch`, then merges every branch's writes back in completion
    /// order. Two branches writing different values to the same key is a
    /// warning, not a failure; the later-completing branch wins.
    async fn run_parallel(self: &Arc<Self>, skill: &Skill, steps: &[PipelineStep], scratch: &mut PipelineScratch, ctx: &ExecutionContext) -> Result<()> {
        let snapshot = scratch.clone();
        let mut tasks = FuturesUnordered::new();

        for nested in steps {
            let engine = self.clone();
            let skill = skill.clone();
            let nested = nested.clone();
            let mut local = snapshot.clone();
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                engine.run_step(&skill, &nested, &mut local, &ctx).await.map(|_| local)
            }));
        }

        while let Some(joined) = tasks.next().await {
            let local = joined.map_err(|e| self.step_failed(skill, "parallel", format!("task panicked: {e}")))??;
            for (key, value) in local {
                if snapshot.get(&key) == Some(&value) {
                    continue;
                }
                if let Some(existing) = scratch.get(&key) {
                    if snapshot.get(&key) != Some(existing) && existing != &value {
                        tracing::warn!(skill = %skill.name, key = %key, "parallel pipeline branches wrote conflicting values; later completion wins");
                    }
                }
                scratch.insert(key, value);
            }
        }

        Ok(())
    }
}

/// Evaluates `run_if`/`skip_if`/`conditional.if` against the pipeline's
/// current local context.
fn evaluate_condition(condition: &Condition, scratch: &PipelineScratch) -> std::result::Result<bool, String> {
    let context = Value::Object(scratch.clone().into_iter().collect());
    let field = path::get(&context, &condition.path).cloned().unwrap_or(Value::Null);

    match condition.operator {
        ConditionOperator::IsEmpty => Ok(is_empty(&field)),
        ConditionOperator::IsNotEmpty => Ok(!is_empty(&field)),
        ConditionOperator::Equals => Ok(field == require_value(condition)?),
        ConditionOperator::NotEquals => Ok(field != require_value(condition)?),
        ConditionOperator::Contains => Ok(contains(&field, require_value(condition)?)),
        ConditionOperator::NotContains => Ok(!contains(&field, require_value(condition)?)),
        ConditionOperator::In => Ok(membership(&field, require_value(condition)?)),
        ConditionOperator::NotIn => Ok(!membership(&field, require_value(condition)?)),
        ConditionOperator::Gt => numeric_compare(&field, require_value(condition)?, |a, b| a > b),
        ConditionOperator::Gte => numeric_compare(&field, require_value(condition)?, |a, b| a >= b),
        ConditionOperator::Lt => numeric_compare(&field, require_value(condition)?, |a, b| a < b),
        ConditionOperator::Lte => numeric_compare(&field, require_value(condition)?, |a, b| a <= b),
    }
}

fn require_value(condition: &Condition) -> std::result::Result<&Value, String> {
    condition
        .value
        .as_ref()
        .ok_or_else(|| format!("operator {:?} requires a comparison value", condition.operator))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
    }
}

fn as_lower_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

fn contains(field: &Value, needle: &Value) -> bool {
    match field {
        Value::String(s) => s.to_lowercase().contains(&as_lower_string(needle)),
        Value::Array(items) => items.iter().any(|item| as_lower_string(item) == as_lower_string(needle)),
        _ => false,
    }
}

fn membership(field: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(field),
        _ => false,
    }
}

fn numeric_compare(field: &Value, other: &Value, op: impl Fn(f64, f64) -> bool) -> std::result::Result<bool, String> {
    let a = coerce_number(field);
    let b = coerce_number(other);
    match (a, b) {
        (Some(a), Some(b)) => Ok(op(a, b)),
        _ => Ok(false),
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_with(value: Value) -> PipelineScratch {
        let Value::Object(map) = value else { panic!("expected object") };
        map.into_iter().collect()
    }

    fn cond(path: &str, operator: ConditionOperator, value: Option<Value>) -> Condition {
        Condition {
            path: path.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn equals_is_strict_and_case_sensitive() {
        let scratch = scratch_with(json!({"status": "Active"}));
        assert!(!evaluate_condition(&cond("status", ConditionOperator::Equals, Some(json!("active"))), &scratch).unwrap());
        assert!(evaluate_condition(&cond("status", ConditionOperator::Equals, Some(json!("Active"))), &scratch).unwrap());
    }

    #[test]
    fn contains_is_case_insensitive_on_strings_and_arrays() {
        let scratch = scratch_with(json!({"name": "Customer Invoice", "tags": ["URGENT", "billing"]}));
        assert!(evaluate_condition(&cond("name", ConditionOperator::Contains, Some(json!("invoice"))), &scratch).unwrap());
        assert!(evaluate_condition(&cond("tags", ConditionOperator::Contains, Some(json!("urgent"))), &scratch).unwrap());
    }

    #[test]
    fn in_operator_is_case_sensitive_membership() {
        let scratch = scratch_with(json!({"code": "US"}));
        assert!(evaluate_condition(&cond("code", ConditionOperator::In, Some(json!(["US", "CA"]))), &scratch).unwrap());
        assert!(!evaluate_condition(&cond("code", ConditionOperator::In, Some(json!(["us", "ca"]))), &scratch).unwrap());
    }

    #[test]
    fn gt_coerces_numeric_strings() {
        let scratch = scratch_with(json!({"amount": "42"}));
        assert!(evaluate_condition(&cond("amount", ConditionOperator::Gt, Some(json!(10))), &scratch).unwrap());
    }

    #[test]
    fn gt_with_non_numeric_value_is_false_not_an_error() {
        let scratch = scratch_with(json!({"amount": "not-a-number"}));
        assert!(!evaluate_condition(&cond("amount", ConditionOperator::Gt, Some(json!(10))), &scratch).unwrap());
    }

    #[test]
    fn is_empty_covers_every_falsy_shape() {
        for value in [json!(null), json!(""), json!([]), json!({}), json!(0), json!(false)] {
            let scratch = scratch_with(json!({"field": value}));
            assert!(
                evaluate_condition(&cond("field", ConditionOperator::IsEmpty, None), &scratch).unwrap(),
                "expected is_empty for {value:?}"
            );
        }
    }

    #[test]
    fn equals_without_a_value_fails_with_a_diagnostic() {
        let scratch = scratch_with(json!({"field": "x"}));
        let err = evaluate_condition(&cond("field", ConditionOperator::Equals, None), &scratch).unwrap_err();
        assert!(err.contains("requires a comparison value"));
    }
}
