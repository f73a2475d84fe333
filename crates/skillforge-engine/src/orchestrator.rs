//! The orchestrator (C10): the per-thread driver that alternates
//! `PLANNING → ACTING → CHECKPOINTING` until a run reaches `END`, a
//! suspension point (`PAUSED_HITL` / `PAUSED_REST`), or a fatal failure.
//!
//! A single call to [`Orchestrator::drive`] runs this loop to whichever
//! suspension point it reaches next — it does not return after one skill,
//! it returns once there is nothing further to do without an external
//! event (a resume, a callback, a reload).

use crate::context::ExecutionContext;
use crate::executor::{self, ExecutorDispatch};
use crate::planner::{Planner, SkillAttempt};
use crate::retry::{put_with_retry, CheckpointRetryConfig};
use serde_json::{json, Value};
use skillforge_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource, PubSub, RunEvent, RunEventMetadata, RunState,
    RunStatus as CheckpointRunStatus, END_SENTINEL,
};
use skillforge_core::{path, CredentialClient, EngineError, HistoryEntry, Result, Run, Skill, SkillRegistry};
use std::sync::Arc;
use uuid::Uuid;

const RUN_EVENTS_CHANNEL: &str = "run_events";
const HISTORY_KEY: &str = "_history";
const STATUS_KEY: &str = "_status";
const ERROR_KEY: &str = "_error";
const FAILED_SKILL_KEY: &str = "_failed_skill";

/// What a [`Orchestrator::drive`] call reached before it had to give control
/// back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed,
    PausedHitl { skill_name: String },
    PausedRest { skill_name: String, correlation_token: String },
    Failed { kind: String, message: String, failed_skill: Option<String> },
}

pub struct Orchestrator {
    registry: Arc<SkillRegistry>,
    checkpointer: Arc<dyn CheckpointSaver>,
    pubsub: Arc<dyn PubSub>,
    dispatch: Arc<ExecutorDispatch>,
    planner: Planner,
    credential_client: Arc<dyn CredentialClient>,
    checkpoint_retry: CheckpointRetryConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SkillRegistry>,
        checkpointer: Arc<dyn CheckpointSaver>,
        pubsub: Arc<dyn PubSub>,
        dispatch: Arc<ExecutorDispatch>,
        planner: Planner,
        credential_client: Arc<dyn CredentialClient>,
    ) -> Self {
        Self {
            registry,
            checkpointer,
            pubsub,
            dispatch,
            planner,
            credential_client,
            checkpoint_retry: CheckpointRetryConfig::default(),
        }
    }

    pub fn with_checkpoint_retry(mut self, retry: CheckpointRetryConfig) -> Self {
        self.checkpoint_retry = retry;
        self
    }

    fn ctx_for(&self, run: &Run) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(run.thread_id.clone(), run.owner_id.clone(), self.credential_client.clone());
        if let Some(workspace_id) = &run.workspace_id {
            ctx = ctx.with_workspace_id(workspace_id.clone());
        }
        if let Some(model) = &run.llm_model {
            ctx = ctx.with_llm_model_override(model.clone());
        }
        ctx
    }

    /// Start a run: write its input checkpoint, then drive the loop.
    pub async fn start(&self, run: &Run) -> Result<TickOutcome> {
        let mut state = RunState::new();
        state.data_store = run.initial_data.clone();
        state.status = CheckpointRunStatus::Running;
        self.save(run, &state, CheckpointSource::Input, None).await?;
        self.drive(run).await
    }

    /// Flip a paused-for-HITL run back to running and re-enter the loop.
    pub async fn resume_hitl(&self, run: &Run) -> Result<TickOutcome> {
        let mut state = self.load_state(&run.thread_id).await?;
        state.status = CheckpointRunStatus::Running;
        state.history.push("HITL approval received".to_string());
        self.save(run, &state, CheckpointSource::Update, None).await?;
        self.drive(run).await
    }

    /// Deliver a REST callback. Returns `Ok(None)` when `correlation_token`
    /// is unknown or was already consumed — the caller maps that to a `409`
    /// conflict, per the exactly-once consumption contract.
    pub async fn deliver_callback(&self, run: &Run, correlation_token: &str, payload: Value) -> Result<Option<TickOutcome>> {
        let Some((record, payload)) = self.dispatch.rest.resume(correlation_token, payload).await? else {
            return Ok(None);
        };

        let workspace_id = run.workspace_id.as_deref();
        let skill = self
            .registry
            .resolve(&record.skill_name, workspace_id)
            .await
            .ok_or_else(|| EngineError::Executor {
                skill: record.skill_name.clone(),
                kind: skillforge_core::ExecutorErrorKind::HttpNon2xx,
                message: "callback arrived for a skill no longer in the registry".to_string(),
            })?;

        let mut state = self.load_state(&run.thread_id).await?;
        let mapped = executor::project_outputs(&skill, false, payload)?;
        self.apply_outputs(&mut state, &skill, &mapped)?;
        state.status = CheckpointRunStatus::Running;
        self.save(run, &state, CheckpointSource::Update, None).await?;

        if skill.hitl_enabled {
            state.status = CheckpointRunStatus::Paused;
            self.save(run, &state, CheckpointSource::Update, None).await?;
            return Ok(Some(TickOutcome::PausedHitl { skill_name: skill.name }));
        }

        Ok(Some(self.drive(run).await?))
    }

    /// Mark a run cancelled. In-flight executors are left to finish but
    /// their outputs are discarded — nothing calls back into this run again.
    pub async fn cancel(&self, run: &Run) -> Result<()> {
        let mut state = self.load_state(&run.thread_id).await?;
        path::set(&mut state.data_store, STATUS_KEY, json!("failed")).ok();
        path::set(
            &mut state.data_store,
            ERROR_KEY,
            json!({"kind": "cancelled", "message": format!("run '{}' was cancelled", run.thread_id)}),
        )
        .ok();
        state.status = CheckpointRunStatus::Error;
        state.history.push("Workflow cancelled".to_string());
        self.save(run, &state, CheckpointSource::Update, None).await?;
        Ok(())
    }

    /// The `PLANNING → ACTING → CHECKPOINTING` loop itself.
    async fn drive(&self, run: &Run) -> Result<TickOutcome> {
        let ctx = self.ctx_for(run);
        let workspace_id = run.workspace_id.as_deref();

        loop {
            let mut state = self.load_state(&run.thread_id).await?;

            if state.active_skill.as_deref() == Some(END_SENTINEL) {
                return Ok(TickOutcome::Completed);
            }

            let skills = self.all_skills(workspace_id).await;
            let history_entries = read_history(&state.data_store);
            let attempts: Vec<SkillAttempt> = history_entries
                .iter()
                .map(|entry| SkillAttempt {
                    skill_name: entry.skill_name.clone(),
                    succeeded: true,
                    resolved_inputs: Value::Object(entry.inputs.clone().into_iter().collect()),
                })
                .collect();

            let eligible = self.planner.eligible_candidates(&state.data_store, &skills, &attempts);
            let candidate = self.planner.decide(&state.data_store, &history_entries, &run.sop, &eligible, &ctx).await?;

            let Some(candidate) = candidate else {
                state.active_skill = Some(END_SENTINEL.to_string());
                state.status = CheckpointRunStatus::Completed;
                state.history.push("Planner chose END".to_string());
                self.save(run, &state, CheckpointSource::Loop, None).await?;
                return Ok(TickOutcome::Completed);
            };

            state.history.push(format!("Planner chose {candidate}"));
            state.active_skill = Some(candidate.clone());

            let skill = eligible
                .iter()
                .find(|s| s.name == candidate)
                .map(|s| (*s).clone())
                .expect("planner only chooses among the candidates it was given");

            match self.resolve_inputs(&skill, &state.data_store) {
                Ok(resolved_inputs) => match executor::run_skill(&skill, resolved_inputs, &self.dispatch, &ctx).await {
                    Ok((mapped, side_effects)) if side_effects.as_ref().is_some_and(|s| s.pause) => {
                        let token = side_effects.and_then(|s| s.callback_token).unwrap_or_default();
                        state.status = CheckpointRunStatus::Paused;
                        self.save(run, &state, CheckpointSource::Loop, None).await?;
                        return Ok(TickOutcome::PausedRest {
                            skill_name: skill.name,
                            correlation_token: token,
                        });
                    }
                    Ok((mapped, _)) => {
                        self.apply_outputs(&mut state, &skill, &mapped)?;
                        self.save(run, &state, CheckpointSource::Loop, None).await?;
                        if skill.hitl_enabled {
                            state.status = CheckpointRunStatus::Paused;
                            self.save(run, &state, CheckpointSource::Loop, None).await?;
                            return Ok(TickOutcome::PausedHitl { skill_name: skill.name });
                        }
                    }
                    Err(e) => return self.fail(run, &mut state, &skill.name, e).await,
                },
                Err(e) => return self.fail(run, &mut state, &skill.name, e).await,
            }
        }
    }

    /// Resolve every `requires` path against the data store. Missing any of
    /// them is fatal — `requires_satisfied` in the planner already excludes
    /// candidates with gaps, so this only re-fails if the data store changed
    /// underneath us between eligibility check and dispatch (it never does
    /// within one serialized tick, but the check stays authoritative).
    fn resolve_inputs(&self, skill: &Skill, data_store: &Value) -> Result<std::collections::BTreeMap<String, Value>> {
        executor::resolve_requires(data_store, &skill.requires).map_err(|missing| EngineError::MissingRequiredInput {
            skill: skill.name.clone(),
            path: missing,
        })
    }

    fn apply_outputs(&self, state: &mut RunState, skill: &Skill, mapped: &std::collections::BTreeMap<String, Value>) -> Result<()> {
        for (key, value) in mapped {
            path::set(&mut state.data_store, key, value.clone()).map_err(|e| EngineError::Executor {
                skill: skill.name.clone(),
                kind: skillforge_core::ExecutorErrorKind::PipelineStepFailed,
                message: format!("failed to write output '{key}': {e}"),
            })?;
        }

        let mut keys: Vec<&String> = mapped.keys().collect();
        keys.sort();
        state.history.push(format!("{} produced {:?}", skill.name, keys));

        let mut history_entries = read_history(&state.data_store);
        history_entries.push(HistoryEntry {
            skill_name: skill.name.clone(),
            skill_version: skill.version,
            ts: chrono::Utc::now(),
            inputs: std::collections::BTreeMap::new(),
            outputs: mapped.clone(),
        });
        write_history(&mut state.data_store, &history_entries)?;
        Ok(())
    }

    async fn fail(&self, run: &Run, state: &mut RunState, failed_skill: &str, err: EngineError) -> Result<TickOutcome> {
        path::set(&mut state.data_store, STATUS_KEY, json!("failed")).ok();
        path::set(&mut state.data_store, ERROR_KEY, json!({"kind": err.kind(), "message": err.to_string()})).ok();
        path::set(&mut state.data_store, FAILED_SKILL_KEY, json!(failed_skill)).ok();
        state.status = CheckpointRunStatus::Error;
        state
            .history
            .push(format!("Workflow failed in {failed_skill}: {}: {err}", err.kind()));
        self.save(run, state, CheckpointSource::Loop, None).await?;
        Ok(TickOutcome::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
            failed_skill: Some(failed_skill.to_string()),
        })
    }

    async fn all_skills(&self, workspace_id: Option<&str>) -> Vec<Skill> {
        let mut skills = Vec::new();
        for name in self.registry.all_names(workspace_id).await {
            if let Some(skill) = self.registry.resolve(&name, workspace_id).await {
                skills.push(skill);
            }
        }
        skills
    }

    async fn load_state(&self, thread_id: &str) -> Result<RunState> {
        let config = CheckpointConfig::new().with_thread_id(thread_id.to_string());
        let tuple = self.checkpointer.get_tuple(&config).await.map_err(checkpoint_error)?;
        match tuple {
            Some(tuple) => RunState::from_channel_values(&tuple.checkpoint.channel_values).map_err(|e| EngineError::CheckpointFlushError {
                attempts: 0,
                message: format!("corrupt checkpoint for thread '{thread_id}': {e}"),
            }),
            None => Ok(RunState::new()),
        }
    }

    /// Durably persist `state` and publish the run-event that follows a
    /// successful save. This is the orchestrator's durability boundary — the
    /// loop never advances to the next planner tick until this returns `Ok`.
    ///
    /// `metadata.extra` also carries `run_name`/`sop`/`owner_id` lifted off
    /// `run` — the denormalized fields a rerun needs to reconstruct the
    /// original `Run` from nothing but a `thread_id`, since the channel
    /// values alone only hold the data store, not the run's own identity.
    async fn save(&self, run: &Run, state: &RunState, source: CheckpointSource, step: Option<i32>) -> Result<()> {
        let config = CheckpointConfig::new().with_thread_id(run.thread_id.clone());
        let checkpoint_id = Uuid::new_v4().to_string();
        let checkpoint = Checkpoint::new(checkpoint_id.clone(), state.clone().into_channel_values());
        let mut metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_extra("run_name".to_string(), Value::String(run.run_name.clone()))
            .with_extra("sop".to_string(), Value::String(run.sop.clone()))
            .with_extra("owner_id".to_string(), Value::String(run.owner_id.clone()));
        if let Some(step) = step {
            metadata = metadata.with_step(step);
        }
        if let Some(workspace_id) = &run.workspace_id {
            metadata = metadata.with_extra("workspace_id".to_string(), Value::String(workspace_id.clone()));
        }
        if let Some(llm_model) = &run.llm_model {
            metadata = metadata.with_extra("llm_model".to_string(), Value::String(llm_model.clone()));
        }
        if let Some(parent_thread_id) = &run.parent_thread_id {
            metadata = metadata.with_extra("parent_thread_id".to_string(), Value::String(parent_thread_id.clone()));
        }

        put_with_retry(self.checkpointer.as_ref(), &config, checkpoint, metadata, &self.checkpoint_retry).await?;

        let event = RunEvent {
            thread_id: run.thread_id.clone(),
            checkpoint_id,
            ts: chrono::Utc::now(),
            metadata: RunEventMetadata {
                active_skill: state.active_skill.clone(),
                status: Some(run_status_label(state.status).to_string()),
            },
        };
        self.pubsub.publish(RUN_EVENTS_CHANNEL, event).await;
        Ok(())
    }
}

fn checkpoint_error(e: skillforge_checkpoint::CheckpointError) -> EngineError {
    EngineError::CheckpointFlushError { attempts: 0, message: e.to_string() }
}

fn run_status_label(status: CheckpointRunStatus) -> &'static str {
    match status {
        CheckpointRunStatus::Pending => "pending",
        CheckpointRunStatus::Running => "running",
        CheckpointRunStatus::Paused => "paused",
        CheckpointRunStatus::Completed => "completed",
        CheckpointRunStatus::Error => "error",
    }
}

/// The structured run history the planner uses for LLM context and the
/// orchestrator uses to rebuild cycle-prevention state across ticks. Kept in
/// a reserved `_history` key inside the data store, alongside the other
/// engine-internal `_`-prefixed bookkeeping keys — distinct from
/// `RunState::history`, which holds the plain-English narration a run's
/// checkpoint row displays.
fn read_history(data_store: &Value) -> Vec<HistoryEntry> {
    path::get(data_store, HISTORY_KEY)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn write_history(data_store: &mut Value, entries: &[HistoryEntry]) -> Result<()> {
    path::set(data_store, HISTORY_KEY, serde_json::to_value(entries).expect("HistoryEntry always serializes")).map_err(|e| {
        EngineError::Executor {
            skill: "orchestrator".to_string(),
            kind: skillforge_core::ExecutorErrorKind::PipelineStepFailed,
            message: format!("failed to record history: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_executor_dispatch, ExecutorDispatchParts};
    use crate::executor::action::{DataQueryHandler, FunctionTable, HttpCallHandler, PythonFunctionHandler, ScriptHandler};
    use crate::executor::llm::LlmExecutor;
    use crate::executor::rest::{InMemoryCallbackStore, RestExecutor};
    use skillforge_checkpoint::InMemoryCheckpointSaver;
    use skillforge_core::{InMemorySkillSource, StaticCredentialClient};

    async fn orchestrator_with(planner_replies: Vec<Value>, registry: Arc<SkillRegistry>) -> Orchestrator {
        let dispatch = build_executor_dispatch(ExecutorDispatchParts {
            llm: LlmExecutor::new(Arc::new(skillforge_llm::MockChatModel::with_json(json!({"x": "produced", "y": "produced"})))),
            rest: RestExecutor::new(Arc::new(InMemoryCallbackStore::new())),
            python_function: PythonFunctionHandler::new(FunctionTable::new()),
            data_query: Arc::new(DataQueryHandler::new()),
            http_call: HttpCallHandler::new(),
            script: ScriptHandler::new(),
            function_table: Arc::new(FunctionTable::new()),
            registry: registry.clone(),
        });
        let planner = Planner::new(Arc::new(SequencedChatModel::new(planner_replies)));
        Orchestrator::new(
            registry,
            Arc::new(InMemoryCheckpointSaver::new()),
            Arc::new(skillforge_checkpoint::BroadcastPubSub::new()),
            dispatch,
            planner,
            Arc::new(StaticCredentialClient::new()),
        )
    }

    /// A `ChatModel` that plays back one canned reply per call, in order —
    /// needed because a real run's planner sees a different eligible set on
    /// each tick and `MockChatModel` can only ever return one fixed reply.
    struct SequencedChatModel {
        replies: std::sync::Mutex<std::collections::VecDeque<Value>>,
    }

    impl SequencedChatModel {
        fn new(replies: Vec<Value>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies.into_iter().collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl skillforge_llm::ChatModel for SequencedChatModel {
        async fn chat(&self, _request: skillforge_llm::ChatRequest) -> skillforge_llm::Result<skillforge_llm::ChatResponse> {
            let reply = self.replies.lock().expect("lock poisoned").pop_front().expect("no more scripted planner replies");
            Ok(skillforge_llm::ChatResponse {
                message: skillforge_llm::Message::assistant(reply.to_string()),
            })
        }

        fn clone_box(&self) -> Box<dyn skillforge_llm::ChatModel> {
            unimplemented!("not needed for these tests")
        }
    }

    fn manifest(name: &str, requires: &str, produces: &str) -> String {
        format!("name: {name}\ndescription: d\nrequires: {requires}\nproduces: {produces}\nexecutor: llm\nprompt: \"hi\"\n")
    }

    #[tokio::test]
    async fn a_run_with_no_eligible_skills_completes_immediately() {
        let registry = Arc::new(SkillRegistry::new());
        let orchestrator = orchestrator_with(vec![json!({"skill_name": "END"})], registry).await;
        let run = Run::new("t1", "demo", "do nothing", "owner-1");
        let outcome = orchestrator.start(&run).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed);
    }

    #[tokio::test]
    async fn a_skill_whose_requires_are_unmet_is_never_offered_so_the_run_completes_instead_of_failing() {
        let source = InMemorySkillSource::new("src").with_manifest("m1", "ws-1", manifest("needs_x", "[x]", "[y]"));
        let registry = Arc::new(SkillRegistry::new().with_source(Box::new(source)));
        registry.load_all().await;

        let orchestrator = orchestrator_with(vec![json!({"skill_name": "END"})], registry).await;
        let mut run = Run::new("t1", "demo", "run it", "owner-1");
        run.workspace_id = Some("ws-1".to_string());

        let outcome = orchestrator.start(&run).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed);
    }

    #[tokio::test]
    async fn a_two_skill_run_drives_straight_through_to_completion() {
        let source = InMemorySkillSource::new("src")
            .with_manifest("m1", "ws-1", manifest("skill_a", "[]", "[x]"))
            .with_manifest("m2", "ws-1", manifest("skill_b", "[x]", "[y]"));
        let registry = Arc::new(SkillRegistry::new().with_source(Box::new(source)));
        registry.load_all().await;

        let orchestrator = orchestrator_with(
            vec![
                json!({"skill_name": "skill_a"}),
                json!({"skill_name": "skill_b"}),
                json!({"skill_name": "END"}),
            ],
            registry,
        )
        .await;
        let mut run = Run::new("t1", "demo", "run a then b", "owner-1");
        run.workspace_id = Some("ws-1".to_string());

        let outcome = orchestrator.start(&run).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed);
    }
}
