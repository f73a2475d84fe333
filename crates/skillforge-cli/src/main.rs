//! # skillforge-cli
//!
//! Optional admin tool for a skillforge deployment: force a registry reload,
//! list runs (optionally by status), and rerun a thread from its last
//! checkpoint. Reads and writes the same checkpoint store the engine itself
//! uses — it has no in-process orchestrator of its own, so `runs rerun` only
//! records the new thread's input checkpoint; a running engine picks it up
//! the same way it would any other pending thread.

mod commands;
mod exit_error;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "skillforge")]
#[command(about = "Admin CLI for a skillforge deployment", long_about = None)]
#[command(version)]
struct Cli {
    /// Database URL for the checkpoint store.
    #[arg(long, env = "SKILLFORGE_DATABASE_URL", default_value = "sqlite://skillforge.db")]
    database_url: String,

    /// Directory to scan for skill manifests. Repeatable.
    #[arg(long = "registry-path", env = "SKILLFORGE_REGISTRY_PATH")]
    registry_paths: Vec<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Skill registry commands
    #[command(subcommand)]
    Skills(SkillsCommands),

    /// Run commands
    #[command(subcommand)]
    Runs(RunsCommands),
}

#[derive(Subcommand)]
enum SkillsCommands {
    /// Force a registry reload and report what loaded.
    Reload,
}

#[derive(Subcommand)]
enum RunsCommands {
    /// List runs, newest checkpoint per thread.
    List {
        /// Only show runs with this status (pending, running, paused, completed, error).
        #[arg(long)]
        status: Option<String>,
    },

    /// Rerun a thread from its last checkpoint: a shortcut for edit-rerun
    /// with no overrides.
    Rerun {
        /// Thread to rerun.
        thread_id: String,
    },
}

#[tokio::main]
async fn main() {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Skills(SkillsCommands::Reload) => commands::skills::reload(&cli.registry_paths).await,
        Commands::Runs(RunsCommands::List { status }) => commands::runs::list(&cli.database_url, status.as_deref()).await,
        Commands::Runs(RunsCommands::Rerun { thread_id }) => commands::runs::rerun(&cli.database_url, &thread_id).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_runs_list_with_status() {
        let cli = Cli::parse_from(["skillforge", "runs", "list", "--status", "paused"]);
        assert!(matches!(cli.command, Commands::Runs(RunsCommands::List { status: Some(s) }) if s == "paused"));
    }

    #[test]
    fn cli_parses_runs_rerun() {
        let cli = Cli::parse_from(["skillforge", "runs", "rerun", "thread-1"]);
        assert!(matches!(cli.command, Commands::Runs(RunsCommands::Rerun { thread_id }) if thread_id == "thread-1"));
    }

    #[test]
    fn cli_parses_skills_reload() {
        let cli = Cli::parse_from(["skillforge", "skills", "reload"]);
        assert!(matches!(cli.command, Commands::Skills(SkillsCommands::Reload)));
    }
}
