//! Engine configuration: registry search paths, the default LLM model,
//! checkpoint buffering parameters, and the planner's retry policy, loaded
//! from YAML with `$include` composition and `${ENV:default}` expansion —
//! the same loader shape `orchestrator::config::loader` uses, narrowed to
//! the one config object this engine needs.

use crate::planner::RetryPolicy;
use crate::retry::CheckpointRetryConfig;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Planner retry policy as it appears in config, mapped 1:1 onto
/// [`RetryPolicy`] but kept as its own `serde`-friendly copy so the planner
/// module doesn't need to know about configuration file shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyConfig {
    NeverRetryFailed,
    #[default]
    RetryOnDependencyChange,
}

impl From<RetryPolicyConfig> for RetryPolicy {
    fn from(value: RetryPolicyConfig) -> Self {
        match value {
            RetryPolicyConfig::NeverRetryFailed => RetryPolicy::NeverRetryFailed,
            RetryPolicyConfig::RetryOnDependencyChange => RetryPolicy::RetryOnDependencyChange,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories a `FilesystemSkillSource` should scan for skill manifests.
    pub registry_paths: Vec<PathBuf>,
    /// Model name used when a run doesn't set its own `llm_model`.
    pub default_llm_model: String,
    /// Checkpoints buffered in memory before `BufferedCheckpointSaver`
    /// flushes to the inner saver.
    pub checkpoint_max_buffered: usize,
    /// Longest a checkpoint may sit unflushed in the buffer.
    pub checkpoint_flush_interval_ms: u64,
    pub checkpoint_retry: CheckpointRetryConfigValues,
    pub planner_retry_policy: RetryPolicyConfig,
}

/// Plain-data mirror of [`CheckpointRetryConfig`] for (de)serialization; the
/// engine type carries a `Duration`-producing method the config format has
/// no business knowing about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointRetryConfigValues {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for CheckpointRetryConfigValues {
    fn default() -> Self {
        let d = CheckpointRetryConfig::default();
        Self {
            max_retries: d.max_retries,
            initial_backoff_ms: d.initial_backoff_ms,
            max_backoff_ms: d.max_backoff_ms,
            backoff_multiplier: d.backoff_multiplier,
            jitter: d.jitter,
        }
    }
}

impl From<CheckpointRetryConfigValues> for CheckpointRetryConfig {
    fn from(v: CheckpointRetryConfigValues) -> Self {
        CheckpointRetryConfig {
            max_retries: v.max_retries,
            initial_backoff_ms: v.initial_backoff_ms,
            max_backoff_ms: v.max_backoff_ms,
            backoff_multiplier: v.backoff_multiplier,
            jitter: v.jitter,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry_paths: Vec::new(),
            default_llm_model: "gpt-4o-mini".to_string(),
            checkpoint_max_buffered: 16,
            checkpoint_flush_interval_ms: 5_000,
            checkpoint_retry: CheckpointRetryConfigValues::default(),
            planner_retry_policy: RetryPolicyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a base config file, optionally deep-merging an override file on
    /// top, then apply `prefix`-scoped environment variable overrides before
    /// validating.
    pub fn load(base_path: impl AsRef<Path>, override_path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut value = load_yaml_file(base_path.as_ref())?;

        if let Some(override_path) = override_path {
            let override_value = load_yaml_file(override_path)?;
            deep_merge(&mut value, &override_value);
        }

        let mut config: EngineConfig = serde_yaml::from_value(value).map_err(|e| ConfigError::Parse {
            path: base_path.as_ref().to_path_buf(),
            message: e.to_string(),
        })?;

        config.apply_env_overrides(env_prefix);
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        if let Ok(model) = tooling::config::get_env_or(&tooling::config::build_env_key(prefix, "default_llm_model"), self.default_llm_model.clone()) {
            self.default_llm_model = model;
        }
        if let Ok(max_buffered) = tooling::config::get_env_parse_or(&tooling::config::build_env_key(prefix, "checkpoint_max_buffered"), self.checkpoint_max_buffered) {
            self.checkpoint_max_buffered = max_buffered;
        }
        if let Ok(flush_interval) = tooling::config::get_env_parse_or(&tooling::config::build_env_key(prefix, "checkpoint_flush_interval_ms"), self.checkpoint_flush_interval_ms) {
            self.checkpoint_flush_interval_ms = flush_interval;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_llm_model.trim().is_empty() {
            return Err(ConfigError::Invalid("default_llm_model must not be empty".to_string()));
        }
        if self.checkpoint_max_buffered == 0 {
            return Err(ConfigError::Invalid("checkpoint_max_buffered must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Load and parse a YAML file, resolving `$include` directives relative to
/// the file's own directory and expanding `${ENV_VAR:default}` references
/// in every string value.
pub fn load_yaml_file(path: &Path) -> Result<YamlValue> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut value: YamlValue = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    process_includes(&mut value, base_dir)?;
    expand_variables(&mut value);

    Ok(value)
}

fn process_includes(value: &mut YamlValue, base_dir: &Path) -> Result<()> {
    match value {
        YamlValue::Mapping(map) => {
            if let Some(YamlValue::String(include_path)) = map.get(&YamlValue::String("$include".to_string())) {
                *value = load_yaml_file(&base_dir.join(include_path))?;
                return Ok(());
            }
            for (_, v) in map.iter_mut() {
                process_includes(v, base_dir)?;
            }
            Ok(())
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                process_includes(item, base_dir)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn expand_variables(value: &mut YamlValue) {
    match value {
        YamlValue::String(s) => {
            if let Some(expanded) = expand_env_in_string(s) {
                *s = expanded;
            }
        }
        YamlValue::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_variables(v);
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                expand_variables(item);
            }
        }
        _ => {}
    }
}

fn expand_env_in_string(s: &str) -> Option<String> {
    if !s.contains("${") {
        return None;
    }

    let re = regex::Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").ok()?;
    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        let full_match = cap.get(0)?.as_str();
        let var_name = cap.get(1)?.as_str();
        let default_value = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        let value = env::var(var_name).unwrap_or_else(|_| default_value.to_string());
        result = result.replace(full_match, &value);
    }
    Some(result)
}

/// Merge `other` over `base`: mappings merge key by key recursively,
/// anything else is a straight override.
pub fn deep_merge(base: &mut YamlValue, other: &YamlValue) {
    match (base, other) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(other_map)) => {
            for (key, other_value) in other_map {
                if let Some(base_value) = base_map.get_mut(key) {
                    deep_merge(base_value, other_value);
                } else {
                    base_map.insert(key.clone(), other_value.clone());
                }
            }
        }
        (base, other) => {
            *base = other.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_model_name_fails_validation() {
        let mut config = EngineConfig::default();
        config.default_llm_model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_checkpoint_buffer_fails_validation() {
        let mut config = EngineConfig::default();
        config.checkpoint_max_buffered = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deep_merge_overrides_nested_keys_and_keeps_siblings() {
        let mut base: YamlValue = serde_yaml::from_str("default_llm_model: base-model\ncheckpoint_max_buffered: 16\n").unwrap();
        let other: YamlValue = serde_yaml::from_str("default_llm_model: override-model\n").unwrap();
        deep_merge(&mut base, &other);

        let config: EngineConfig = serde_yaml::from_value(base).unwrap();
        assert_eq!(config.default_llm_model, "override-model");
        assert_eq!(config.checkpoint_max_buffered, 16);
    }

    #[test]
    fn env_expansion_falls_back_to_default_when_var_is_unset() {
        let expanded = expand_env_in_string("${SKILLFORGE_TEST_UNSET_VAR_XYZ:fallback}").unwrap();
        assert_eq!(expanded, "fallback");
    }

    #[test]
    fn include_directive_pulls_in_the_referenced_file() {
        let dir = tempfile::tempdir().unwrap();
        let included_path = dir.path().join("included.yaml");
        let mut included = std::fs::File::create(&included_path).unwrap();
        writeln!(included, "default_llm_model: from-include").unwrap();

        let main_path = dir.path().join("main.yaml");
        let mut main = std::fs::File::create(&main_path).unwrap();
        writeln!(main, "$include: included.yaml").unwrap();

        let value = load_yaml_file(&main_path).unwrap();
        let config: EngineConfig = serde_yaml::from_value(value).unwrap();
        assert_eq!(config.default_llm_model, "from-include");
    }
}
