//! The [`Skill`] data model: the unit of work the planner chooses between
//! and an executor runs. A skill declares what data it needs
//! ([`Skill::requires`]), what it's contractually obligated to produce
//! ([`Skill::produces`]), and what it may additionally produce without that
//! being load-bearing for anyone downstream ([`Skill::optional_produces`]).

use crate::pipeline::PipelineDef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub requires: BTreeSet<String>,
    #[serde(default)]
    pub produces: BTreeSet<String>,
    #[serde(default)]
    pub optional_produces: BTreeSet<String>,

    pub executor: ExecutorKind,

    #[serde(default)]
    pub hitl_enabled: bool,

    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub rest_config: Option<RestConfig>,
    #[serde(default)]
    pub action_config: Option<ActionConfig>,

    /// Bumped whenever a skill's manifest changes; lets a run's history
    /// record which revision of a skill actually executed.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Populated by the registry at load time, never present in a raw
    /// manifest on disk or in a database row.
    #[serde(skip)]
    pub source: Option<SkillSourceMeta>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Llm,
    Rest,
    Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    pub url_template: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    PythonFunction {
        function: String,
        #[serde(default)]
        module: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    DataQuery {
        connector: String,
        query: String,
        #[serde(default)]
        credential_ref: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    HttpCall {
        url_template: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Script {
        path: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    DataPipeline {
        pipeline: PipelineDef,
    },
}

impl ActionConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionConfig::PythonFunction { .. } => "python_function",
            ActionConfig::DataQuery { .. } => "data_query",
            ActionConfig::HttpCall { .. } => "http_call",
            ActionConfig::Script { .. } => "script",
            ActionConfig::DataPipeline { .. } => "data_pipeline",
        }
    }

    /// The sub-handler's execution timeout, or `None` for `data_pipeline`
    /// (whose own steps carry whatever timeouts they individually need).
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            ActionConfig::PythonFunction { timeout_ms, .. }
            | ActionConfig::DataQuery { timeout_ms, .. }
            | ActionConfig::HttpCall { timeout_ms, .. }
            | ActionConfig::Script { timeout_ms, .. } => Some(*timeout_ms),
            ActionConfig::DataPipeline { .. } => None,
        }
    }
}

/// Where a loaded skill came from, recorded by the registry for diagnostics
/// and for resolving filesystem-vs-database override precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSourceMeta {
    pub source: SkillSource,
    pub is_public: bool,
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillSource {
    Filesystem,
    Database,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkillValidationError {
    #[error("skill '{0}' has overlapping requires/produces paths: {1:?}")]
    RequiresProducesOverlap(String, BTreeSet<String>),

    #[error("skill '{0}' declares both rest_config and action_config")]
    ConflictingExecConfig(String),

    #[error("skill '{0}' has executor 'rest' but no rest_config")]
    MissingRestConfig(String),

    #[error("skill '{0}' has executor 'action' but no action_config")]
    MissingActionConfig(String),

    #[error("skill '{0}' has executor 'llm' but rest_config or action_config set")]
    LlmWithExecConfig(String),

    #[error("skill '{0}' has empty name")]
    EmptyName,
}

impl Skill {
    /// Validate the cross-field invariants a manifest must satisfy before a
    /// skill is usable: `requires` and `produces` must be disjoint, and
    /// exactly the execution config matching `executor` may be present.
    pub fn validate(&self) -> Result<(), SkillValidationError> {
        if self.name.trim().is_empty() {
            return Err(SkillValidationError::EmptyName);
        }

        let overlap: BTreeSet<String> = self
            .requires
            .intersection(&self.produces)
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(SkillValidationError::RequiresProducesOverlap(
                self.name.clone(),
                overlap,
            ));
        }

        if self.rest_config.is_some() && self.action_config.is_some() {
            return Err(SkillValidationError::ConflictingExecConfig(
                self.name.clone(),
            ));
        }

        match self.executor {
            ExecutorKind::Llm => {
                if self.rest_config.is_some() || self.action_config.is_some() {
                    return Err(SkillValidationError::LlmWithExecConfig(self.name.clone()));
                }
            }
            ExecutorKind::Rest => {
                if self.rest_config.is_none() {
                    return Err(SkillValidationError::MissingRestConfig(self.name.clone()));
                }
            }
            ExecutorKind::Action => {
                if self.action_config.is_none() {
                    return Err(SkillValidationError::MissingActionConfig(self.name.clone()));
                }
            }
        }

        Ok(())
    }

    /// All paths a skill may possibly write: `produces` plus
    /// `optional_produces`. Used to build an LLM executor's output schema.
    pub fn all_possible_outputs(&self) -> BTreeSet<String> {
        self.produces
            .union(&self.optional_produces)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_skill(executor: ExecutorKind) -> Skill {
        Skill {
            name: "summarize".to_string(),
            description: "summarize a document".to_string(),
            requires: BTreeSet::from(["document.text".to_string()]),
            produces: BTreeSet::from(["document.summary".to_string()]),
            optional_produces: BTreeSet::new(),
            executor,
            hitl_enabled: false,
            prompt: Some("Summarize: {document.text}".to_string()),
            system_prompt: None,
            rest_config: None,
            action_config: None,
            version: 1,
            tags: vec![],
            source: None,
        }
    }

    #[test]
    fn valid_llm_skill_passes() {
        assert!(base_skill(ExecutorKind::Llm).validate().is_ok());
    }

    #[test]
    fn rejects_overlapping_requires_and_produces() {
        let mut skill = base_skill(ExecutorKind::Llm);
        skill.produces.insert("document.text".to_string());
        assert!(matches!(
            skill.validate(),
            Err(SkillValidationError::RequiresProducesOverlap(_, _))
        ));
    }

    #[test]
    fn rest_executor_requires_rest_config() {
        let skill = base_skill(ExecutorKind::Rest);
        assert!(matches!(
            skill.validate(),
            Err(SkillValidationError::MissingRestConfig(_))
        ));
    }

    #[test]
    fn rejects_both_rest_and_action_config() {
        let mut skill = base_skill(ExecutorKind::Rest);
        skill.rest_config = Some(RestConfig {
            url_template: "https://example.com/{id}".to_string(),
            method: "POST".to_string(),
            timeout_ms: 5000,
            headers: BTreeMap::new(),
        });
        skill.action_config = Some(ActionConfig::Script {
            path: "./run.sh".to_string(),
            args: vec![],
            timeout_ms: 30_000,
        });
        assert!(matches!(
            skill.validate(),
            Err(SkillValidationError::ConflictingExecConfig(_))
        ));
    }

    #[test]
    fn all_possible_outputs_unions_produces_and_optional() {
        let mut skill = base_skill(ExecutorKind::Llm);
        skill
            .optional_produces
            .insert("document.confidence".to_string());
        let all = skill.all_possible_outputs();
        assert!(all.contains("document.summary"));
        assert!(all.contains("document.confidence"));
    }
}
