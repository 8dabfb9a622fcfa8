use crate::error::{LoomError, Result};
use crate::types::Phase;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const LOOM_DIR: &str = ".loom";
pub const CONFIG_FILE: &str = ".loom/config.yaml";

pub const DEFAULT_AGENTS_DIR: &str = "agents";
pub const DEFAULT_KNOWLEDGE_DIR: &str = "knowledge";
pub const PROJECTS_DIR: &str = "projects";
pub const WORKSPACES_DIR: &str = "workspaces";

pub const COMPOSITION_FILE: &str = "_composition.yaml";
pub const TASKS_DIR: &str = "tasks";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const HANDOFFS_DIR: &str = "handoffs";
pub const REQUESTS_DIR: &str = "requests";
pub const PROMPTS_DIR: &str = "prompts";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn loom_dir(root: &Path) -> PathBuf {
    root.join(LOOM_DIR)
}

pub fn manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join(MANIFEST_FILE)
}

pub fn phase_artifacts_dir(project_dir: &Path, phase: Phase) -> PathBuf {
    project_dir.join(ARTIFACTS_DIR).join(phase.as_str())
}

pub fn handoff_path(project_dir: &Path, phase: Phase) -> PathBuf {
    project_dir
        .join(HANDOFFS_DIR)
        .join(format!("{}.json", phase.as_str()))
}

pub fn request_path(project_dir: &Path, phase: Phase) -> PathBuf {
    project_dir
        .join(REQUESTS_DIR)
        .join(format!("{}.json", phase.as_str()))
}

pub fn prompt_path(project_dir: &Path, phase: Phase) -> PathBuf {
    project_dir
        .join(PROMPTS_DIR)
        .join(format!("{}.md", phase.as_str()))
}

/// Render `path` relative to `base` with forward slashes, or the full path
/// when it lies outside `base`.
pub fn relative_display(base: &Path, path: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap())
}

/// Agent, task, project, and workspace ids all become single path components.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<()> {
    if value.is_empty() || value.len() > 64 || value.contains("..") || !ident_re().is_match(value)
    {
        return Err(LoomError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
