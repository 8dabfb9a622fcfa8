use crate::error::Result;
use crate::io;
use crate::manifest::PhaseTransition;
use crate::paths;
use crate::types::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Advisory note left by a phase for whoever picks up the next one.
/// Nothing enforces it; it is folded into the next prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub from_phase: Phase,
    pub agent: String,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HandoffRecord {
    /// Build a record from the phase's artifact. `completed` falls back to
    /// `summary` when the artifact has no `completed` list.
    pub fn from_artifact(phase: Phase, agent: &str, artifact: &Value) -> Self {
        let completed = match string_list(artifact.get("completed")) {
            list if !list.is_empty() => list,
            _ => string_list(artifact.get("summary")),
        };
        Self {
            from_phase: phase,
            agent: agent.to_string(),
            completed,
            next_steps: string_list(artifact.get("next_steps")),
            notes: artifact
                .get("notes")
                .and_then(Value::as_str)
                .map(str::to_string),
            created_at: Utc::now(),
        }
    }

    pub fn load(project_dir: &Path, phase: Phase) -> Result<Option<Self>> {
        let path = paths::handoff_path(project_dir, phase);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let record = serde_json::from_str(&data).map_err(|e| io::json_error(&path, e))?;
        Ok(Some(record))
    }

    /// Like `load`, but an unreadable record is logged and treated as absent.
    fn load_advisory(project_dir: &Path, phase: Phase) -> Option<Self> {
        match Self::load(project_dir, phase) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(phase = %phase, error = %e, "ignoring unreadable handoff record");
                None
            }
        }
    }

    /// The record left by the most recent transition into `phase`.
    pub fn latest_before(
        project_dir: &Path,
        history: &[PhaseTransition],
        phase: Phase,
    ) -> Option<Self> {
        history
            .iter()
            .rev()
            .find(|t| t.to == phase)
            .and_then(|t| Self::load_advisory(project_dir, t.from))
    }

    /// Persist unless an equivalent record (ignoring `created_at`) is
    /// already on disk. An unreadable record is overwritten. Returns true
    /// if written.
    pub fn save(&self, project_dir: &Path) -> Result<bool> {
        if let Some(existing) = Self::load_advisory(project_dir, self.from_phase) {
            if existing.same_content(self) {
                return Ok(false);
            }
        }
        let path = paths::handoff_path(project_dir, self.from_phase);
        let data = serde_json::to_string_pretty(self)?;
        io::atomic_write(&path, data.as_bytes())?;
        Ok(true)
    }

    fn same_content(&self, other: &Self) -> bool {
        self.from_phase == other.from_phase
            && self.agent == other.agent
            && self.completed == other.completed
            && self.next_steps == other.next_steps
            && self.notes == other.notes
    }

    pub fn render_markdown(&self) -> String {
        let mut out = format!("## Handoff from {} ({})\n", self.from_phase, self.agent);
        if !self.completed.is_empty() {
            out.push_str("\nCompleted:\n");
            for item in &self.completed {
                out.push_str(&format!("- {item}\n"));
            }
        }
        if !self.next_steps.is_empty() {
            out.push_str("\nSuggested next steps:\n");
            for item in &self.next_steps {
                out.push_str(&format!("- {item}\n"));
            }
        }
        if let Some(notes) = &self.notes {
            out.push_str(&format!("\nNotes: {notes}\n"));
        }
        out
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn from_artifact_reads_lists_and_summary() {
        let artifact = json!({
            "status": "COMPLETE",
            "summary": "Planned three milestones",
            "next_steps": ["scaffold crate", "write parser"],
            "notes": "parser is the risky part"
        });
        let h = HandoffRecord::from_artifact(Phase::Planning, "planner", &artifact);
        assert_eq!(h.completed, vec!["Planned three milestones"]);
        assert_eq!(h.next_steps.len(), 2);
        assert_eq!(h.notes.as_deref(), Some("parser is the risky part"));
    }

    #[test]
    fn from_artifact_tolerates_missing_fields() {
        let h = HandoffRecord::from_artifact(Phase::Testing, "tester", &json!({"status": 1}));
        assert!(h.completed.is_empty());
        assert!(h.next_steps.is_empty());
        assert!(h.notes.is_none());
    }

    #[test]
    fn save_is_idempotent_for_equal_content() {
        let dir = TempDir::new().unwrap();
        let artifact = json!({"completed": ["a"], "next_steps": ["b"]});
        let first = HandoffRecord::from_artifact(Phase::Coding, "developer", &artifact);
        assert!(first.save(dir.path()).unwrap());

        let again = HandoffRecord::from_artifact(Phase::Coding, "developer", &artifact);
        assert!(!again.save(dir.path()).unwrap());

        let loaded = HandoffRecord::load(dir.path(), Phase::Coding).unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn load_absent_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(HandoffRecord::load(dir.path(), Phase::Planning)
            .unwrap()
            .is_none());
    }

    #[test]
    fn latest_before_follows_history() {
        let dir = TempDir::new().unwrap();
        let plan = HandoffRecord::from_artifact(Phase::Planning, "planner", &json!({"summary": "p"}));
        plan.save(dir.path()).unwrap();
        let history = vec![PhaseTransition {
            from: Phase::Planning,
            to: Phase::Coding,
            at: Utc::now(),
            note: None,
        }];
        let found = HandoffRecord::latest_before(dir.path(), &history, Phase::Coding).unwrap();
        assert_eq!(found.agent, "planner");
        assert!(HandoffRecord::latest_before(dir.path(), &history, Phase::Testing).is_none());
    }

    #[test]
    fn corrupt_record_is_skipped_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = paths::handoff_path(dir.path(), Phase::Planning);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        let history = vec![PhaseTransition {
            from: Phase::Planning,
            to: Phase::Coding,
            at: Utc::now(),
            note: None,
        }];
        assert!(HandoffRecord::load(dir.path(), Phase::Planning).is_err());
        assert!(HandoffRecord::latest_before(dir.path(), &history, Phase::Coding).is_none());

        let plan = HandoffRecord::from_artifact(Phase::Planning, "planner", &json!({"summary": "p"}));
        assert!(plan.save(dir.path()).unwrap());
        assert!(HandoffRecord::load(dir.path(), Phase::Planning).unwrap().is_some());
    }

    #[test]
    fn markdown_lists_steps() {
        let h = HandoffRecord::from_artifact(
            Phase::Planning,
            "planner",
            &json!({"completed": ["plan"], "next_steps": ["code it"]}),
        );
        let md = h.render_markdown();
        assert!(md.starts_with("## Handoff from PLANNING (planner)"));
        assert!(md.contains("- code it"));
    }
}
