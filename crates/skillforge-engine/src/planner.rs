//! The planner (C9): an LLM call whose answer is a closed choice over the
//! currently eligible skill names plus `END`. Free-text reasoning is
//! accepted alongside the choice but never authoritative — only the enum
//! value decides what happens next.

use crate::context::ExecutionContext;
use serde::Deserialize;
use serde_json::{json, Value};
use skillforge_core::{path, EngineError, HistoryEntry, Result, Skill};
use skillforge_llm::{ChatModel, ChatRequest, Message};
use std::sync::Arc;

pub const END: &str = "END";

/// Governs whether a skill that previously failed may be offered to the
/// planner again. Defaults to `RetryOnDependencyChange`, the behavior a run
/// gets when nothing overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// A failed skill never becomes a candidate again within the same run.
    NeverRetryFailed,
    /// A failed skill becomes eligible again once at least one of its
    /// `requires` paths has produced a value it didn't have at the time it
    /// failed.
    #[default]
    RetryOnDependencyChange,
}

/// One candidate the planner is allowed to choose, with just enough history
/// to decide eligibility: has it run, did it fail, and against what inputs.
#[derive(Debug, Clone)]
pub struct SkillAttempt {
    pub skill_name: String,
    pub succeeded: bool,
    pub resolved_inputs: Value,
}

#[derive(Debug, Deserialize)]
struct PlannerChoice {
    skill_name: String,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: Option<String>,
}

pub struct Planner {
    model: Arc<dyn ChatModel>,
    retry_policy: RetryPolicy,
}

impl Planner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Every skill whose `requires` are currently satisfied and which
    /// hasn't already been ruled out by cycle prevention or retry policy.
    pub fn eligible_candidates<'a>(&self, data_store: &Value, skills: &'a [Skill], attempts: &[SkillAttempt]) -> Vec<&'a Skill> {
        skills
            .iter()
            .filter(|skill| self.requires_satisfied(skill, data_store))
            .filter(|skill| self.cycle_allows(skill, attempts, data_store))
            .collect()
    }

    fn requires_satisfied(&self, skill: &Skill, data_store: &Value) -> bool {
        skill.requires.iter().all(|required| path::has(data_store, required))
    }

    fn cycle_allows(&self, skill: &Skill, attempts: &[SkillAttempt], data_store: &Value) -> bool {
        let Some(last) = attempts.iter().rev().find(|a| a.skill_name == skill.name) else {
            return true;
        };

        if last.succeeded {
            return skill.hitl_enabled;
        }

        match self.retry_policy {
            RetryPolicy::NeverRetryFailed => false,
            RetryPolicy::RetryOnDependencyChange => skill.requires.iter().any(|required| path::get(data_store, required) != path::get(&last.resolved_inputs, required)),
        }
    }

    /// Ask the model to choose among `candidates` plus `END`. Returns the
    /// chosen skill name, or `None` for `END`. If `candidates` is empty the
    /// planner must choose `END` without consulting the model at all.
    pub async fn decide(&self, data_store: &Value, history: &[HistoryEntry], sop: &str, candidates: &[&Skill], _ctx: &ExecutionContext) -> Result<Option<String>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let names: Vec<&str> = candidates.iter().map(|s| s.name.as_str()).collect();
        let schema = choice_schema(&names);

        let history_summary = history.iter().map(|h| format!("{} produced {:?}", h.skill_name, h.outputs.keys().collect::<Vec<_>>())).collect::<Vec<_>>().join("\n");

        let prompt = format!(
            "Standard operating procedure:\n{sop}\n\nCurrent data store:\n{}\n\nHistory so far:\n{}\n\nEligible skills: {}\n\nChoose exactly one skill to run next, or choose END if the procedure is complete.",
            data_store,
            if history_summary.is_empty() { "(none)" } else { &history_summary },
            names.join(", "),
        );

        let messages = vec![Message::system("You are a workflow planner. Choose the single best next step."), Message::human(prompt)];
        let request = ChatRequest::new(messages).with_output_schema(schema);

        let response = self.model.chat(request).await.map_err(|e| EngineError::PlannerNoChoice(e.to_string()))?;

        let choice: PlannerChoice = serde_json::from_str(response.text()).map_err(|e| EngineError::PlannerNoChoice(format!("planner reply was not a valid choice: {e}")))?;

        if choice.skill_name == END {
            return Ok(None);
        }
        if !names.contains(&choice.skill_name.as_str()) {
            return Err(EngineError::PlannerNoChoice(format!("planner chose '{}' which is not among the eligible candidates", choice.skill_name)));
        }
        Ok(Some(choice.skill_name))
    }
}

fn choice_schema(names: &[&str]) -> Value {
    let mut options: Vec<&str> = names.to_vec();
    options.push(END);
    json!({
        "type": "object",
        "properties": {
            "skill_name": { "type": "string", "enum": options },
            "reasoning": { "type": "string" }
        },
        "required": ["skill_name"]
    })
}
