//! Declarative shape of a `data_pipeline` action: a small mini-DAG of steps
//! that an `action_config` of type `data_pipeline` carries as data. This
//! crate only defines the shape; executing a [`PipelineDef`] is the job of
//! the orchestration engine, which needs the same type to deserialize skill
//! manifests and to walk while running them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDef {
    pub steps: Vec<PipelineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    #[serde(flatten)]
    pub kind: PipelineStepKind,
    #[serde(default)]
    pub run_if: Option<Condition>,
    #[serde(default)]
    pub skip_if: Option<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineStepKind {
    /// Run a query against a registered data connector.
    Query {
        connector: String,
        query: String,
        #[serde(default)]
        credential_ref: Option<String>,
        #[serde(default)]
        output: Option<String>,
    },
    /// Apply a pure in-process transform (e.g. a jq-style expression) to
    /// existing pipeline state.
    Transform {
        expression: String,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        output: Option<String>,
    },
    /// Invoke another skill by name, feeding it the pipeline's current data.
    Skill { skill: String },
    /// Merge named upstream step outputs into a single value.
    Merge { inputs: Vec<String>, output: String },
    /// Run the nested steps concurrently; each sub-step sees an isolated
    /// copy of the pipeline state until all finish, then results are
    /// merged back (last writer wins, on a key collision).
    Parallel { steps: Vec<PipelineStep> },
    /// Branch on a condition, running one of two nested step lists.
    Conditional {
        condition: Condition,
        then: Vec<PipelineStep>,
        #[serde(default)]
        otherwise: Vec<PipelineStep>,
    },
    /// Run a nested pipeline definition as a single step.
    Pipeline { pipeline: Box<PipelineDef> },
}

/// A single boolean test evaluated against the pipeline's current data
/// store, using the same dotted-path addressing as skill `requires`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub path: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    IsEmpty,
    IsNotEmpty,
}

/// Per-pipeline-run working set: step id -> produced value, kept separate
/// from the run's durable data store so a pipeline can be retried without
/// leaving partial writes behind.
pub type PipelineScratch = BTreeMap<String, serde_json::Value>;
