//! The `script` action sub-handler (§4.6.4): spawns a subprocess, sends
//! `resolved_inputs` as JSON on stdin, expects a JSON object back on stdout.
//! A non-zero exit or non-JSON stdout is fatal for the skill.

use serde_json::Value;
use skillforge_core::{ActionConfig, EngineError, ExecutorErrorKind, Result, Skill};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct ScriptHandler {
    /// Directory each skill was loaded from, keyed by skill name, used to
    /// resolve a relative script path against the skill's own folder rather
    /// than the engine's working directory.
    skill_dirs: BTreeMap<String, std::path::PathBuf>,
}

impl ScriptHandler {
    pub fn new() -> Self {
        Self {
            skill_dirs: BTreeMap::new(),
        }
    }

    pub fn with_skill_dir(mut self, skill_name: impl Into<String>, dir: impl Into<std::path::PathBuf>) -> Self {
        self.skill_dirs.insert(skill_name.into(), dir.into());
        self
    }

    pub async fn run(&self, skill: &Skill, config: &ActionConfig, resolved_inputs: &BTreeMap<String, Value>) -> Result<Value> {
        let ActionConfig::Script { path, args, .. } = config else {
            unreachable!("dispatched only for script configs")
        };

        let fatal = |message: String| EngineError::Executor {
            skill: skill.name.clone(),
            kind: ExecutorErrorKind::SubprocessNonzero,
            message,
        };

        let script_path = Path::new(path);
        let mut command = if script_path.is_relative() {
            let mut resolved = self.skill_dirs.get(&skill.name).cloned().unwrap_or_default();
            resolved.push(script_path);
            Command::new(resolved)
        } else {
            Command::new(script_path)
        };
        command.args(args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| fatal(format!("failed to spawn script: {e}")))?;

        let stdin_payload = serde_json::to_vec(resolved_inputs).map_err(|e| fatal(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&stdin_payload).await.map_err(|e| fatal(e.to_string()))?;
        }

        let output = child.wait_with_output().await.map_err(|e| fatal(e.to_string()))?;
        if !output.status.success() {
            return Err(fatal(format!(
                "script exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| fatal(format!("script stdout was not a JSON object: {e}")))
    }
}

impl Default for ScriptHandler {
    fn default() -> Self {
        Self::new()
    }
}
