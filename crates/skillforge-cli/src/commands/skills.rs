//! `skills reload` — force the registry to re-scan its sources.

use crate::exit_error::ExitError;
use skillforge_core::{FilesystemSkillSource, SkillRegistry};

pub async fn reload(registry_paths: &[std::path::PathBuf]) -> Result<(), ExitError> {
    if registry_paths.is_empty() {
        return Err(ExitError::usage("no --registry-path given (or SKILLFORGE_REGISTRY_PATH set)"));
    }

    let mut registry = SkillRegistry::new();
    for (i, path) in registry_paths.iter().enumerate() {
        registry = registry.with_source(Box::new(FilesystemSkillSource::new(format!("fs-{i}"), path.clone())));
    }

    let report = registry.load_all().await;

    println!("loaded {} skill(s) from {} path(s)", report.loaded.len(), registry_paths.len());
    for name in &report.loaded {
        println!("  + {name}");
    }
    for diagnostic in &report.diagnostics {
        eprintln!("  ! {}/{}: {}", diagnostic.source_id, diagnostic.manifest_id, diagnostic.message);
    }

    if report.loaded.is_empty() && !report.diagnostics.is_empty() {
        return Err(ExitError::runtime("registry reload produced only diagnostics, no skills loaded"));
    }

    Ok(())
}
