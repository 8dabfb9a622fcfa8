//! Request/response files for work handed to an external operator.
//!
//! A delegated step writes the composed prompt to `prompts/<PHASE>.md` and a
//! request describing the expected artifact to `requests/<PHASE>.json`. The
//! operator answers by writing the artifact; the next step picks it up.

use crate::config::PhaseHandlerConfig;
use crate::error::Result;
use crate::io;
use crate::paths;
use crate::types::Phase;
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const BANNER_START: &str = "=== LOOM DELEGATION REQUEST ===";
pub const BANNER_END: &str = "=== END LOOM DELEGATION REQUEST ===";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentinel {
    pub field: String,
    pub equals: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub request_id: Uuid,
    pub project_id: String,
    pub workspace: String,
    pub phase: Phase,
    pub agent: String,
    pub task: String,
    /// Relative to the project directory.
    pub prompt_path: String,
    /// Relative to the project directory.
    pub expected_artifact: String,
    pub sentinel: Sentinel,
    pub created_at: DateTime<Utc>,
}

impl DelegationRequest {
    pub fn new(
        ws: &Workspace,
        project_id: &str,
        phase: Phase,
        handler: &PhaseHandlerConfig,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            workspace: ws.label().to_string(),
            phase,
            agent: handler.agent.clone(),
            task: handler.task.clone(),
            prompt_path: format!("{}/{}.md", paths::PROMPTS_DIR, phase),
            expected_artifact: format!(
                "{}/{}/{}",
                paths::ARTIFACTS_DIR,
                phase,
                handler.expects.artifact
            ),
            sentinel: Sentinel {
                field: handler.expects.field.clone(),
                equals: handler.expects.equals.clone(),
            },
            created_at: Utc::now(),
        }
    }

    pub fn load(project_dir: &Path, phase: Phase) -> Result<Option<Self>> {
        let path = paths::request_path(project_dir, phase);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let request = serde_json::from_str(&data).map_err(|e| io::json_error(&path, e))?;
        Ok(Some(request))
    }

    /// Same work item, ignoring identity and timestamp.
    fn same_target(&self, other: &Self) -> bool {
        self.project_id == other.project_id
            && self.workspace == other.workspace
            && self.phase == other.phase
            && self.agent == other.agent
            && self.task == other.task
            && self.prompt_path == other.prompt_path
            && self.expected_artifact == other.expected_artifact
            && self.sentinel == other.sentinel
    }

    /// Write the prompt and the request file. An existing request for the
    /// same work item is kept as is, so its id survives repeated steps; an
    /// unreadable one is replaced. Returns the effective request and whether
    /// anything was written.
    pub fn publish(self, project_dir: &Path, prompt: &str) -> Result<(Self, bool)> {
        let prompt_path = paths::prompt_path(project_dir, self.phase);
        let prompt_written = io::write_if_changed(&prompt_path, prompt.as_bytes())?;

        match Self::load(project_dir, self.phase) {
            Ok(Some(existing)) if existing.same_target(&self) => {
                return Ok((existing, prompt_written));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(phase = %self.phase, error = %e, "replacing unreadable delegation request");
            }
        }

        let path = paths::request_path(project_dir, self.phase);
        let mut data = serde_json::to_string_pretty(&self)?;
        data.push('\n');
        io::atomic_write(&path, data.as_bytes())?;
        tracing::info!(
            project = %self.project_id,
            phase = %self.phase,
            request_id = %self.request_id,
            "delegation request written"
        );
        Ok((self, true))
    }
}

/// The request framed for an operator reading the terminal.
pub fn render_banner(request: &DelegationRequest) -> Result<String> {
    let body = serde_json::to_string_pretty(request)?;
    Ok(format!("{BANNER_START}\n{body}\n{BANNER_END}\n"))
}

/// Poll until `path` exists with content whose sha256 differs from
/// `baseline`. A zero timeout checks exactly once.
pub fn wait_for_file(
    path: &Path,
    baseline: Option<&str>,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    let started = Instant::now();
    loop {
        if path.is_file() {
            match baseline {
                None => return Ok(true),
                Some(b) if io::sha256_file(path)? != b => return Ok(true),
                Some(_) => {}
            }
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Ok(false);
        }
        std::thread::sleep(interval.min(timeout - elapsed));
    }
}
