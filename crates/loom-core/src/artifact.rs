//! Per-phase JSON artifacts and the gate that reads them.
//!
//! Artifacts live under `<project>/artifacts/<PHASE>/<name>`. A phase is
//! complete once its expected artifact exists, parses, carries the required
//! fields, and holds the sentinel value.

use crate::config::{Expectation, Rework};
use crate::error::{LoomError, Result};
use crate::io;
use crate::manifest::ArtifactRef;
use crate::paths;
use crate::types::Phase;
use crate::workspace::Workspace;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    project_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(ws: &Workspace, project: &str) -> Result<Self> {
        Ok(Self {
            project_dir: ws.project_dir(project)?,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn path(&self, phase: Phase, name: &str) -> Result<PathBuf> {
        paths::validate_identifier("artifact", name)?;
        Ok(paths::phase_artifacts_dir(&self.project_dir, phase).join(name))
    }

    /// Path relative to the project directory, as recorded in the manifest.
    pub fn relative(&self, phase: Phase, name: &str) -> String {
        format!("{}/{}/{}", paths::ARTIFACTS_DIR, phase, name)
    }

    pub fn exists(&self, phase: Phase, name: &str) -> bool {
        self.path(phase, name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn read(&self, phase: Phase, name: &str) -> Result<Value> {
        let path = self.path(phase, name)?;
        io::read_json_value(
            &path,
            "artifact",
            &format!("write the {phase} artifact with `loom artifact put`"),
        )
    }

    pub fn write(&self, phase: Phase, name: &str, value: &Value) -> Result<PathBuf> {
        let path = self.path(phase, name)?;
        let mut data = serde_json::to_string_pretty(value)?;
        data.push('\n');
        io::atomic_write(&path, data.as_bytes())?;
        tracing::debug!(path = %path.display(), "artifact written");
        Ok(path)
    }

    /// Sorted file names under one phase directory.
    pub fn list(&self, phase: Phase) -> Result<Vec<String>> {
        let dir = paths::phase_artifacts_dir(&self.project_dir, phase);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Every phase that has at least one artifact.
    pub fn list_all(&self) -> Result<BTreeMap<Phase, Vec<String>>> {
        let mut all = BTreeMap::new();
        for &phase in Phase::all() {
            let names = self.list(phase)?;
            if !names.is_empty() {
                all.insert(phase, names);
            }
        }
        Ok(all)
    }

    pub fn reference(&self, phase: Phase, name: &str) -> Result<ArtifactRef> {
        let path = self.path(phase, name)?;
        Ok(ArtifactRef {
            path: self.relative(phase, name),
            sha256: io::sha256_file(&path)?,
            recorded_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    Missing {
        path: String,
    },
    Malformed {
        path: String,
        message: String,
    },
    FieldsMissing {
        path: String,
        fields: Vec<String>,
    },
    Mismatch {
        path: String,
        field: String,
        expected: String,
        found: Option<String>,
    },
    Satisfied {
        path: String,
    },
    Rework {
        path: String,
        to: Phase,
    },
}

impl GateOutcome {
    /// One-line status suitable for the manifest.
    pub fn describe(&self) -> String {
        match self {
            GateOutcome::Missing { path } => format!("waiting for {path}"),
            GateOutcome::Malformed { path, message } => {
                format!("blocked: {path} is not valid JSON ({message})")
            }
            GateOutcome::FieldsMissing { path, fields } => {
                format!("blocked: {path} is missing {}", fields.join(", "))
            }
            GateOutcome::Mismatch {
                path,
                field,
                expected,
                found,
            } => format!(
                "blocked: {path} has {field}={} (expected {expected})",
                found.as_deref().unwrap_or("<absent>")
            ),
            GateOutcome::Satisfied { path } => format!("{path} accepted"),
            GateOutcome::Rework { path, to } => format!("{path} requests rework in {to}"),
        }
    }
}

pub struct GateCheck;

impl GateCheck {
    /// Evaluate the expected artifact of `phase`. I/O failures other than
    /// a missing or unparsable file are returned as errors.
    pub fn evaluate(
        store: &ArtifactStore,
        phase: Phase,
        expects: &Expectation,
        rework: Option<&Rework>,
    ) -> Result<GateOutcome> {
        let path = store.relative(phase, &expects.artifact);
        if !store.exists(phase, &expects.artifact) {
            return Ok(GateOutcome::Missing { path });
        }

        let value = match store.read(phase, &expects.artifact) {
            Ok(v) => v,
            Err(LoomError::MalformedJson { line, message, .. }) => {
                let message = match line {
                    Some(l) => format!("line {l}: {message}"),
                    None => message,
                };
                return Ok(GateOutcome::Malformed { path, message });
            }
            Err(e) => return Err(e),
        };

        let missing: Vec<String> = expects
            .required_fields
            .iter()
            .filter(|f| lookup_field(&value, f).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Ok(GateOutcome::FieldsMissing {
                path,
                fields: missing,
            });
        }

        let found = lookup_field(&value, &expects.field).map(render);
        match found {
            Some(ref f) if *f == expects.equals => Ok(GateOutcome::Satisfied { path }),
            Some(ref f) if rework.is_some_and(|r| r.equals == *f) => Ok(GateOutcome::Rework {
                path,
                to: rework.map(|r| r.to).unwrap_or(phase),
            }),
            _ => Ok(GateOutcome::Mismatch {
                path,
                field: expects.field.clone(),
                expected: expects.equals.clone(),
                found,
            }),
        }
    }
}

/// Resolve a dotted field path; numeric segments index into arrays.
pub fn lookup_field<'v>(value: &'v Value, field: &str) -> Option<&'v Value> {
    field.split('.').try_fold(value, |v, seg| match v {
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => v.get(seg),
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
