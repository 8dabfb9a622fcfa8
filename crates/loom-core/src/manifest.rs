use crate::error::{LoomError, Result};
use crate::io;
use crate::paths;
use crate::types::Phase;
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Top-level keys a manifest must carry before it is deserialized.
pub const REQUIRED_FIELDS: &[&str] = &["project_id", "phase", "artifacts"];

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Relative to the project directory.
    pub path: String,
    pub sha256: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub project_id: String,
    pub phase: Phase,
    #[serde(default)]
    pub status: String,
    pub artifacts: BTreeMap<Phase, Vec<ArtifactRef>>,
    #[serde(default)]
    pub history: Vec<PhaseTransition>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            phase: Phase::Planning,
            status: "created".to_string(),
            artifacts: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    pub fn create(ws: &Workspace, project_id: &str) -> Result<Self> {
        let path = paths::manifest_path(&ws.project_dir(project_id)?);
        if path.exists() {
            return Err(LoomError::ProjectExists(project_id.to_string()));
        }
        let manifest = Self::new(project_id);
        manifest.save(ws)?;
        Ok(manifest)
    }

    pub fn load(ws: &Workspace, project_id: &str) -> Result<Self> {
        let project_dir = ws.project_dir(project_id)?;
        let path = paths::manifest_path(&project_dir);
        if !path.exists() {
            return Err(LoomError::ProjectNotFound {
                project: project_id.to_string(),
                searched: path,
            });
        }
        let value = io::read_json_value(&path, "manifest", "")?;
        let manifest = Self::from_value(&path, value)?;
        // `save` derives its target from `project_id`, so a mismatch would
        // write into another project's directory.
        if manifest.project_id != project_id {
            return Err(LoomError::ManifestProjectMismatch {
                path,
                expected: project_id.to_string(),
                found: manifest.project_id,
            });
        }
        Ok(manifest)
    }

    /// Check the required keys and the phase by hand so failures name the
    /// field instead of surfacing a bare deserialization error.
    pub fn from_value(path: &Path, mut value: Value) -> Result<Self> {
        let Some(obj) = value.as_object_mut() else {
            return Err(LoomError::MalformedJson {
                path: path.to_path_buf(),
                line: None,
                message: "manifest must be a JSON object".to_string(),
            });
        };

        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !obj.contains_key(**f))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoomError::MissingManifestFields {
                path: path.to_path_buf(),
                fields: missing,
            });
        }

        let raw_phase = match &obj["phase"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let phase = Phase::from_str(&raw_phase)?;
        obj.insert("phase".to_string(), Value::String(phase.as_str().to_string()));

        serde_json::from_value(value).map_err(|e| io::json_error(path, e))
    }

    pub fn save(&self, ws: &Workspace) -> Result<()> {
        let path = paths::manifest_path(&ws.project_dir(&self.project_id)?);
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        io::atomic_write(&path, data.as_bytes())
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    /// Returns true if the status actually changed.
    pub fn set_status(&mut self, status: impl Into<String>) -> bool {
        let status = status.into();
        if self.status == status {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }

    /// Record an artifact reference. An identical path+hash is a no-op; a
    /// changed hash for the same path replaces the entry.
    pub fn record_artifact(&mut self, phase: Phase, reference: ArtifactRef) -> bool {
        let refs = self.artifacts.entry(phase).or_default();
        if let Some(existing) = refs.iter_mut().find(|r| r.path == reference.path) {
            if existing.sha256 == reference.sha256 {
                return false;
            }
            *existing = reference;
        } else {
            refs.push(reference);
        }
        self.updated_at = Utc::now();
        true
    }

    pub fn transition(&mut self, to: Phase, note: Option<String>) {
        let now = Utc::now();
        self.history.push(PhaseTransition {
            from: self.phase,
            to,
            at: now,
            note,
        });
        self.phase = to;
        self.updated_at = now;
    }

    /// True when this exact artifact content was already consumed by a
    /// transition out of `phase`.
    pub fn has_recorded(&self, phase: Phase, reference: &ArtifactRef) -> bool {
        self.artifacts.get(&phase).is_some_and(|refs| {
            refs.iter()
                .any(|r| r.path == reference.path && r.sha256 == reference.sha256)
        })
    }

    pub fn last_transition(&self) -> Option<&PhaseTransition> {
        self.history.last()
    }

    /// Recorded references whose files no longer exist. Informational only.
    pub fn missing_artifact_files(&self, ws: &Workspace) -> Result<Vec<String>> {
        let project_dir = ws.project_dir(&self.project_id)?;
        Ok(self
            .artifacts
            .values()
            .flatten()
            .filter(|r| !project_dir.join(&r.path).exists())
            .map(|r| r.path.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
