//! The skill registry (C1): aggregates skill manifests from one or more
//! [`SkillSource`]s and resolves `(name, workspace_id)` lookups against
//! them, applying workspace-scoped override rules.
//!
//! A filesystem source provides the shared, public skill library every
//! workspace can see; a database source provides workspace-private skills
//! that shadow a public skill of the same name within that workspace only.
//! Neither source can see the other's skills directly — the registry is the
//! only thing that merges them.

use crate::skill::{Skill, SkillSource as SkillSourceKind, SkillSourceMeta};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read skill source '{source}': {message}")]
    SourceUnavailable { source: String, message: String },
}

/// One diagnostic produced while loading a single skill manifest. A bad
/// manifest never aborts the whole load — it's recorded here and the rest
/// of the source keeps loading.
#[derive(Debug, Clone)]
pub struct SkillDiagnostic {
    pub source_id: String,
    pub manifest_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RegistryLoadReport {
    pub loaded: Vec<String>,
    pub diagnostics: Vec<SkillDiagnostic>,
}

#[async_trait]
pub trait SkillSource: Send + Sync {
    /// Stable identifier for this source, used in diagnostics.
    fn id(&self) -> &str;

    /// Load every skill manifest this source currently holds. Per-manifest
    /// parse/validation failures are returned alongside successfully loaded
    /// skills rather than failing the whole call.
    async fn load(&self) -> Result<(Vec<Skill>, Vec<SkillDiagnostic>), RegistryError>;
}

/// Reads one skill manifest per `*.yaml`/`*.yml` file in a directory. Every
/// filesystem skill is public: it's visible to every workspace unless a
/// database source overrides it for a specific one.
pub struct FilesystemSkillSource {
    id: String,
    root: PathBuf,
}

impl FilesystemSkillSource {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }
}

#[async_trait]
impl SkillSource for FilesystemSkillSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load(&self) -> Result<(Vec<Skill>, Vec<SkillDiagnostic>), RegistryError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| RegistryError::SourceUnavailable {
                source: self.id.clone(),
                message: e.to_string(),
            })?;

        let mut skills = Vec::new();
        let mut diagnostics = Vec::new();

        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| RegistryError::SourceUnavailable {
                    source: self.id.clone(),
                    message: e.to_string(),
                })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml {
                continue;
            }
            let manifest_id = path.display().to_string();

            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    diagnostics.push(SkillDiagnostic {
                        source_id: self.id.clone(),
                        manifest_id,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            match parse_and_validate(&contents, &self.id, SkillSourceKind::Filesystem, true, None) {
                Ok(skill) => skills.push(skill),
                Err(message) => diagnostics.push(SkillDiagnostic {
                    source_id: self.id.clone(),
                    manifest_id,
                    message,
                }),
            }
        }

        Ok((skills, diagnostics))
    }
}

/// An in-process stand-in for a database-backed source: workspace-scoped
/// skill manifests kept in memory, for tests and for embedding without a
/// real database dependency.
pub struct InMemorySkillSource {
    id: String,
    manifests: Vec<(String, Option<String>, String)>, // (manifest_id, workspace_id, yaml)
}

impl InMemorySkillSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            manifests: Vec::new(),
        }
    }

    /// Add a workspace-private manifest: visible only within `workspace_id`,
    /// shadowing a public skill of the same name there.
    pub fn with_manifest(
        mut self,
        manifest_id: impl Into<String>,
        workspace_id: impl Into<String>,
        yaml: impl Into<String>,
    ) -> Self {
        self.manifests
            .push((manifest_id.into(), Some(workspace_id.into()), yaml.into()));
        self
    }

    /// Add a database-sourced manifest with no owning workspace: visible
    /// across every workspace, same as a filesystem skill. Use this for
    /// skills created through an admin surface rather than authored on disk.
    pub fn with_public_manifest(mut self, manifest_id: impl Into<String>, yaml: impl Into<String>) -> Self {
        self.manifests.push((manifest_id.into(), None, yaml.into()));
        self
    }
}

#[async_trait]
impl SkillSource for InMemorySkillSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load(&self) -> Result<(Vec<Skill>, Vec<SkillDiagnostic>), RegistryError> {
        let mut skills = Vec::new();
        let mut diagnostics = Vec::new();

        for (manifest_id, workspace_id, yaml) in &self.manifests {
            let is_public = workspace_id.is_none();
            match parse_and_validate(yaml, &self.id, SkillSourceKind::Database, is_public, workspace_id.clone()) {
                Ok(skill) => skills.push(skill),
                Err(message) => diagnostics.push(SkillDiagnostic {
                    source_id: self.id.clone(),
                    manifest_id: manifest_id.clone(),
                    message,
                }),
            }
        }

        Ok((skills, diagnostics))
    }
}

fn parse_and_validate(
    yaml: &str,
    source_id: &str,
    source_kind: SkillSourceKind,
    is_public: bool,
    workspace_id: Option<String>,
) -> Result<Skill, String> {
    let mut skill: Skill = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
    skill.validate().map_err(|e| e.to_string())?;
    skill.source = Some(SkillSourceMeta {
        source: source_kind,
        is_public,
        workspace_id,
        id: format!("{source_id}:{}", skill.name),
    });
    Ok(skill)
}

/// Aggregates skills from every registered source and resolves lookups with
/// workspace-scoped override semantics: a non-public skill shadows a public
/// skill of the same name, but only within its own `workspace_id`.
pub struct SkillRegistry {
    sources: Vec<Box<dyn SkillSource>>,
    public: RwLock<BTreeMap<String, Skill>>,
    workspace_scoped: RwLock<BTreeMap<(String, String), Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            public: RwLock::new(BTreeMap::new()),
            workspace_scoped: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_source(mut self, source: Box<dyn SkillSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Reload every source, replacing the registry's entire contents. A
    /// source that fails outright contributes no skills and is recorded as
    /// a diagnostic, but does not prevent other sources from loading.
    pub async fn load_all(&self) -> RegistryLoadReport {
        let mut report = RegistryLoadReport::default();
        let mut public = BTreeMap::new();
        let mut workspace_scoped = BTreeMap::new();

        for source in &self.sources {
            match source.load().await {
                Ok((skills, diagnostics)) => {
                    report.diagnostics.extend(diagnostics);
                    for skill in skills {
                        let meta = skill.source.as_ref().expect("set by parse_and_validate");
                        report.loaded.push(skill.name.clone());
                        if meta.is_public {
                            public.insert(skill.name.clone(), skill);
                        } else if let Some(workspace_id) = meta.workspace_id.clone() {
                            workspace_scoped.insert((workspace_id, skill.name.clone()), skill);
                        } else {
                            report.diagnostics.push(SkillDiagnostic {
                                source_id: source.id().to_string(),
                                manifest_id: skill.name.clone(),
                                message: "non-public skill has no workspace_id".to_string(),
                            });
                        }
                    }
                }
                Err(e) => report.diagnostics.push(SkillDiagnostic {
                    source_id: source.id().to_string(),
                    manifest_id: String::new(),
                    message: e.to_string(),
                }),
            }
        }

        *self.public.write().await = public;
        *self.workspace_scoped.write().await = workspace_scoped;
        report
    }

    /// Resolve a skill by name, preferring a workspace-scoped override over
    /// the public library.
    pub async fn resolve(&self, name: &str, workspace_id: Option<&str>) -> Option<Skill> {
        if let Some(workspace_id) = workspace_id {
            if let Some(skill) = self
                .workspace_scoped
                .read()
                .await
                .get(&(workspace_id.to_string(), name.to_string()))
            {
                return Some(skill.clone());
            }
        }
        self.public.read().await.get(name).cloned()
    }

    pub async fn all_names(&self, workspace_id: Option<&str>) -> Vec<String> {
        let mut names: Vec<String> = self.public.read().await.keys().cloned().collect();
        if let Some(workspace_id) = workspace_id {
            for (ws, name) in self.workspace_scoped.read().await.keys() {
                if ws == workspace_id && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_skill_yaml(name: &str) -> String {
        format!(
            "name: {name}\ndescription: test skill\nrequires: []\nproduces: [out.value]\nexecutor: llm\nprompt: \"hi\"\n"
        )
    }

    #[tokio::test]
    async fn workspace_scoped_skill_is_only_visible_in_its_own_workspace() {
        let registry = SkillRegistry::new().with_source(Box::new(
            InMemorySkillSource::new("ws-db").with_manifest("m1", "ws-1", llm_skill_yaml("greet")),
        ));

        let report = registry.load_all().await;
        assert!(report.diagnostics.is_empty());

        let resolved = registry.resolve("greet", Some("ws-1")).await;
        assert!(resolved.is_some());
        assert_eq!(
            resolved.unwrap().source.unwrap().workspace_id,
            Some("ws-1".to_string())
        );
        assert!(registry.resolve("greet", Some("ws-2")).await.is_none());
        assert!(registry.resolve("greet", None).await.is_none());
    }

    #[tokio::test]
    async fn invalid_manifest_becomes_a_diagnostic_not_a_hard_failure() {
        let registry = SkillRegistry::new().with_source(Box::new(
            InMemorySkillSource::new("bad").with_manifest("m1", "ws-1", "not: valid: yaml: ["),
        ));
        let report = registry.load_all().await;
        assert!(report.loaded.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn public_db_sourced_skill_is_visible_across_workspaces() {
        let registry = SkillRegistry::new().with_source(Box::new(
            InMemorySkillSource::new("ws-db").with_public_manifest("m1", llm_skill_yaml("broadcast")),
        ));
        let report = registry.load_all().await;
        assert!(report.diagnostics.is_empty());

        let resolved = registry.resolve("broadcast", Some("ws-1")).await.unwrap();
        assert!(resolved.source.as_ref().unwrap().is_public);
        assert_eq!(resolved.source.unwrap().source, SkillSourceKind::Database);
        assert!(registry.resolve("broadcast", None).await.is_some());
    }

    #[tokio::test]
    async fn all_names_lists_public_and_workspace_scoped_skills() {
        let registry = SkillRegistry::new().with_source(Box::new(
            InMemorySkillSource::new("ws-db").with_manifest("m1", "ws-1", llm_skill_yaml("greet")),
        ));
        registry.load_all().await;
        let names = registry.all_names(Some("ws-1")).await;
        assert_eq!(names, vec!["greet".to_string()]);
        assert!(registry.all_names(Some("ws-2")).await.is_empty());
    }
}
