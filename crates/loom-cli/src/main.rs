mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand, ValueEnum};
use cmd::{
    agent::AgentSubcommand, artifact::ArtifactSubcommand, config::ConfigSubcommand,
    handoff::HandoffSubcommand, project::ProjectSubcommand,
};
use loom_core::{types::ExecutionMode, workspace::Workspace};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Hand work to an operator
    Delegated,
    /// Fabricate synthetic artifacts where the handler allows it
    Autonomous,
}

impl From<ModeArg> for ExecutionMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Delegated => ExecutionMode::Delegated,
            ModeArg::Autonomous => ExecutionMode::Autonomous,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "loom",
    about = "Compose agent prompts from a file library and track project phases",
    version,
    propagate_version = true
)]
struct Cli {
    /// Library root (default: auto-detect from .loom/ or .git/)
    #[arg(long, global = true, env = "LOOM_ROOT")]
    root: Option<PathBuf>,

    /// Workspace holding the projects (default: the root workspace)
    #[arg(long, global = true, env = "LOOM_WORKSPACE")]
    workspace: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a loom library in the current directory
    Init,

    /// Run one phase-handler step for a project
    Run {
        project: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Delegated)]
        mode: ModeArg,
        /// Poll this many seconds for the expected artifact, then step again
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
        /// Extra placeholder value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Compose the prompt for an agent task
    Compose {
        agent: String,
        task: String,
        /// Fill project_id, phase, and the latest handoff from this project
        #[arg(long)]
        project: Option<String>,
        /// Extra placeholder value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Write the prompt to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Inspect the agent library
    Agent {
        #[command(subcommand)]
        subcommand: AgentSubcommand,
    },

    /// Create and inspect project manifests
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Read and write phase artifacts
    Artifact {
        #[command(subcommand)]
        subcommand: ArtifactSubcommand,
    },

    /// Show phase handoff records
    Handoff {
        #[command(subcommand)]
        subcommand: HandoffSubcommand,
    },

    /// Record the QA decision for a project awaiting approval
    Approve {
        project: String,
        /// Reject and send the project back for rework
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Move a project in production into maintenance
    Maintain {
        project: String,
        #[arg(long)]
        reason: String,
    },

    /// Inspect the framework configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = Workspace::resolve(&root, cli.workspace.as_deref())
        .map_err(anyhow::Error::from)
        .and_then(|ws| match cli.command {
            Commands::Init => cmd::init::run(&root, cli.json),
            Commands::Run {
                project,
                mode,
                wait,
                vars,
            } => cmd::run::run(&root, &ws, &project, mode.into(), wait, &vars, cli.json),
            Commands::Compose {
                agent,
                task,
                project,
                vars,
                out,
            } => cmd::compose::run(
                &root,
                &ws,
                &agent,
                &task,
                project.as_deref(),
                &vars,
                out.as_deref(),
                cli.json,
            ),
            Commands::Agent { subcommand } => cmd::agent::run(&root, subcommand, cli.json),
            Commands::Project { subcommand } => cmd::project::run(&ws, subcommand, cli.json),
            Commands::Artifact { subcommand } => cmd::artifact::run(&ws, subcommand, cli.json),
            Commands::Handoff { subcommand } => cmd::handoff::run(&ws, subcommand, cli.json),
            Commands::Approve {
                project,
                reject,
                by,
                reason,
            } => cmd::approve::run(
                &root,
                &ws,
                &project,
                !reject,
                by.as_deref(),
                reason.as_deref(),
                cli.json,
            ),
            Commands::Maintain { project, reason } => {
                cmd::maintain::run(&root, &ws, &project, &reason, cli.json)
            }
            Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
