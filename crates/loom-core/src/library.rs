//! Discovery and loading of agents, tasks, and knowledge files.
//!
//! An agent is a directory under `agents_dir` holding a `_composition.yaml`,
//! a set of Markdown fragments, and a `tasks/` folder where every task is a
//! `<id>.md` text paired with a `<id>.yaml` metadata file.

use crate::config::LibraryConfig;
use crate::error::{LoomError, Result};
use crate::io;
use crate::paths;
use crate::types::FragmentKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Composition spec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Overrides `composer.separator` for this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    #[serde(default = "default_include_context")]
    pub include_context: bool,
    #[serde(default)]
    pub sections: Vec<SectionSpec>,
}

fn default_include_context() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionSpec {
    pub kind: FragmentKind,
    /// Relative to the agent directory, or to `knowledge_dir` for knowledge
    /// sections. Task sections default to `tasks/<task>.md`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

// ---------------------------------------------------------------------------
// Task metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub id: String,
    pub phase: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Context variables that must be supplied before composing.
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub meta: TaskMeta,
    pub text_path: PathBuf,
    pub meta_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    agents_dir: PathBuf,
    knowledge_dir: PathBuf,
}

impl Library {
    pub fn open(root: &Path, cfg: &LibraryConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            agents_dir: root.join(&cfg.agents_dir),
            knowledge_dir: root.join(&cfg.knowledge_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }

    pub fn knowledge_dir(&self) -> &Path {
        &self.knowledge_dir
    }

    /// Sorted agent identifiers: every directory with a composition spec.
    pub fn agents(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.agents_dir) else {
            return Vec::new();
        };
        let mut agents: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join(paths::COMPOSITION_FILE).is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        agents.sort();
        agents
    }

    pub fn agent_dir(&self, agent: &str) -> Result<PathBuf> {
        paths::validate_identifier("agent", agent)?;
        let dir = self.agents_dir.join(agent);
        if !dir.join(paths::COMPOSITION_FILE).is_file() {
            return Err(LoomError::AgentNotFound {
                agent: agent.to_string(),
                searched: dir,
                available: self.agents(),
            });
        }
        Ok(dir)
    }

    /// Sorted task ids that have both a text and a metadata file.
    pub fn tasks(&self, agent: &str) -> Vec<String> {
        let tasks_dir = self.agents_dir.join(agent).join(paths::TASKS_DIR);
        let Ok(entries) = std::fs::read_dir(&tasks_dir) else {
            return Vec::new();
        };
        let mut tasks: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|x| x.to_str()) != Some("md") {
                    return None;
                }
                let stem = path.file_stem()?.to_string_lossy().into_owned();
                tasks_dir
                    .join(format!("{stem}.yaml"))
                    .is_file()
                    .then_some(stem)
            })
            .collect();
        tasks.sort();
        tasks
    }

    pub fn composition(&self, agent: &str) -> Result<CompositionSpec> {
        let path = self.agent_dir(agent)?.join(paths::COMPOSITION_FILE);
        io::read_yaml(
            &path,
            "composition spec",
            "add a _composition.yaml listing the agent's sections",
        )
    }

    pub fn task(&self, agent: &str, task: &str) -> Result<TaskDefinition> {
        paths::validate_identifier("task", task)?;
        let tasks_dir = self.agent_dir(agent)?.join(paths::TASKS_DIR);
        let text_path = tasks_dir.join(format!("{task}.md"));
        let meta_path = tasks_dir.join(format!("{task}.yaml"));

        let missing: Vec<PathBuf> = [&text_path, &meta_path]
            .into_iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LoomError::TaskNotFound {
                agent: agent.to_string(),
                task: task.to_string(),
                searched: missing,
                available: self.tasks(agent),
            });
        }

        let meta: TaskMeta = io::read_yaml(
            &meta_path,
            "task metadata",
            "declare at least `id` and `phase`",
        )?;
        if meta.id != task {
            return Err(LoomError::TaskMetadataMismatch {
                task: task.to_string(),
                found: meta.id,
            });
        }

        Ok(TaskDefinition {
            meta,
            text_path,
            meta_path,
        })
    }

    /// Resolve a knowledge reference; the `.yaml` extension is optional.
    pub fn knowledge_path(&self, name: &str) -> PathBuf {
        let direct = self.knowledge_dir.join(name);
        if Path::new(name).extension().is_some() {
            return direct;
        }
        let with_ext = self.knowledge_dir.join(format!("{name}.yaml"));
        if with_ext.is_file() || !direct.is_file() {
            with_ext
        } else {
            direct
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
