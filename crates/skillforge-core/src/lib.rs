//! # skillforge-core — skill manifests, path resolution, credentials, and
//! the run/history data model.
//!
//! This crate defines the nouns the rest of the workspace operates on:
//!
//! - [`skill::Skill`] — the manifest a skill author writes: what it needs,
//!   what it produces, and how it executes.
//! - [`registry::SkillRegistry`] — aggregates skill manifests from one or
//!   more [`registry::SkillSource`]s and resolves name lookups with
//!   workspace-scoped override rules.
//! - [`path`] — dotted-path `get`/`set`/`has` over the `serde_json::Value`
//!   tree backing a run's data store.
//! - [`credentials::CredentialClient`] — the trait boundary an executor
//!   calls through to resolve a credential reference into usable secret
//!   material; resolving it is an external collaborator's job.
//! - [`run::Run`] and [`run::CallbackRecord`] — the run/thread request model
//!   and the pending-REST-callback record a paused thread waits on.
//! - [`error::EngineError`] — the full error taxonomy a run can fail with,
//!   shared by every crate downstream so `_error.kind` is always one of a
//!   closed set of strings.

pub mod credentials;
pub mod error;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod run;
pub mod skill;

pub use credentials::{Credential, CredentialClient, CredentialError, StaticCredentialClient};
pub use error::{EngineError, ExecutorErrorKind, Result};
pub use path::PathError;
pub use pipeline::{Condition, ConditionOperator, PipelineDef, PipelineScratch, PipelineStep, PipelineStepKind};
pub use registry::{
    FilesystemSkillSource, InMemorySkillSource, RegistryError, RegistryLoadReport, SkillDiagnostic,
    SkillRegistry, SkillSource as SkillSourceTrait,
};
pub use run::{CallbackRecord, HistoryEntry, Run, RunStatus};
pub use skill::{
    ActionConfig, ExecutorKind, RestConfig, Skill, SkillSource, SkillSourceMeta,
    SkillValidationError,
};
