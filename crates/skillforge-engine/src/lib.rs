//! # skillforge-engine — the run loop around the skill registry
//!
//! This crate wires [`skillforge_core`]'s skill/registry/pipeline data model
//! and [`skillforge_checkpoint`]'s durable state together into a running
//! orchestrator: a planner picks the next skill, an executor runs it, the
//! output mapping projects what it produced back into the run's data store,
//! and a checkpoint lands before the loop ticks again.
//!
//! Nothing here talks to a transport. Starting, resuming, and inspecting runs
//! are plain async methods on [`orchestrator::Orchestrator`]; a caller wires
//! those onto HTTP, a CLI, or anything else on the outside.

pub mod build;
pub mod config;
pub mod context;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod retry;

pub use build::{build_executor_dispatch, ExecutorDispatchParts};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use executor::{project_outputs, run_skill, Executor, ExecutorDispatch, ExecutorOutcome, SideEffects};
pub use orchestrator::{Orchestrator, TickOutcome};
pub use planner::{Planner, RetryPolicy};
