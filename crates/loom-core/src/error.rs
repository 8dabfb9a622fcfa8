use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoomError {
    #[error("not initialized: no .loom/config.yaml under {}; run 'loom init'", .root.display())]
    NotInitialized { root: PathBuf },

    #[error(
        "agent not found: '{agent}' (searched {}); valid agents: {}",
        .searched.display(),
        list_or_none(.available)
    )]
    AgentNotFound {
        agent: String,
        searched: PathBuf,
        available: Vec<String>,
    },

    #[error(
        "task not found: '{task}' for agent '{agent}' (searched {}); available tasks: {}",
        display_paths(.searched),
        list_or_none(.available)
    )]
    TaskNotFound {
        agent: String,
        task: String,
        searched: Vec<PathBuf>,
        available: Vec<String>,
    },

    #[error("missing {kind} file: {} ({hint})", .path.display())]
    MissingFile {
        kind: String,
        path: PathBuf,
        hint: String,
    },

    #[error("malformed YAML in {}{}: {message}", .path.display(), at_line(.line))]
    MalformedYaml {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("malformed JSON in {}{}: {message}", .path.display(), at_line(.line))]
    MalformedJson {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("manifest {} is missing required field(s): {}", .path.display(), .fields.join(", "))]
    MissingManifestFields { path: PathBuf, fields: Vec<String> },

    #[error("invalid phase '{0}': expected one of {phases}", phases = crate::types::Phase::names().join(", "))]
    InvalidPhase(String),

    #[error("invalid {kind} identifier '{value}': use letters, digits, '-', '_' or '.' (max 64 chars)")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("unresolved placeholder '${{{name}}}' in {origin}")]
    UnresolvedPlaceholder { name: String, origin: String },

    #[error("task '{task}' requires context variable '{name}' (pass --var {name}=...)")]
    MissingContextVariable { task: String, name: String },

    #[error("task metadata for '{task}' declares id '{found}'")]
    TaskMetadataMismatch { task: String, found: String },

    #[error("project already exists: {0}")]
    ProjectExists(String),

    #[error(
        "manifest {} belongs to project '{found}', not '{expected}'; fix project_id or move the directory",
        .path.display()
    )]
    ManifestProjectMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("project not found: '{project}' (searched {})", .searched.display())]
    ProjectNotFound { project: String, searched: PathBuf },

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoomError>;

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}
