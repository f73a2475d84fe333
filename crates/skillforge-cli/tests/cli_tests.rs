//! Integration tests for skillforge-cli: drives the built binary against a
//! real skill manifest directory and a throwaway sqlite database file.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_skillforge")
}

fn llm_skill_yaml(name: &str) -> String {
    format!(
        r#"name: {name}
description: test skill
requires: []
produces: [result]
executor: llm
prompt: "do the thing"
"#
    )
}

#[test]
fn skills_reload_reports_every_manifest_in_the_directory() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.yaml"), llm_skill_yaml("greet")).unwrap();
    fs::write(dir.path().join("summarize.yaml"), llm_skill_yaml("summarize")).unwrap();

    let output = Command::new(bin())
        .args(["--registry-path", dir.path().to_str().unwrap(), "skills", "reload"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("greet"));
    assert!(stdout.contains("summarize"));
}

#[test]
fn skills_reload_with_no_registry_path_is_a_usage_error() {
    let output = Command::new(bin()).args(["skills", "reload"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn skills_reload_surfaces_a_bad_manifest_as_a_diagnostic_not_a_crash() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.yaml"), "not: [valid, skill, manifest").unwrap();
    fs::write(dir.path().join("ok.yaml"), llm_skill_yaml("ok")).unwrap();

    let output = Command::new(bin())
        .args(["--registry-path", dir.path().to_str().unwrap(), "skills", "reload"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok"));
}

#[test]
fn runs_rerun_against_an_unknown_thread_is_not_found() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("runs.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let output = Command::new(bin())
        .args(["--database-url", &database_url, "runs", "rerun", "does-not-exist"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn runs_list_against_an_empty_database_reports_no_runs() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("runs.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let output = Command::new(bin()).args(["--database-url", &database_url, "runs", "list"]).output().unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no runs found"));
}

#[test]
fn runs_list_rejects_an_unknown_status() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("runs.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let output = Command::new(bin())
        .args(["--database-url", &database_url, "runs", "list", "--status", "nonsense"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}
