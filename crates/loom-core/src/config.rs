use crate::error::{LoomError, Result};
use crate::library::Library;
use crate::paths;
use crate::types::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LibraryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: String,
}

fn default_agents_dir() -> String {
    paths::DEFAULT_AGENTS_DIR.to_string()
}

fn default_knowledge_dir() -> String {
    paths::DEFAULT_KNOWLEDGE_DIR.to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            agents_dir: default_agents_dir(),
            knowledge_dir: default_knowledge_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// ComposerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposerConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Soft limit: larger prompts are still returned, with a warning.
    #[serde(default = "default_max_prompt_bytes")]
    pub max_prompt_bytes: usize,
    #[serde(default = "default_strict")]
    pub strict_placeholders: bool,
}

fn default_separator() -> String {
    "\n\n---\n\n".to_string()
}

fn default_max_prompt_bytes() -> usize {
    200_000
}

fn default_strict() -> bool {
    true
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            max_prompt_bytes: default_max_prompt_bytes(),
            strict_placeholders: default_strict(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase handlers
// ---------------------------------------------------------------------------

/// The artifact a phase waits for, and the sentinel that lets it advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub artifact: String,
    pub field: String,
    pub equals: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rework {
    pub equals: String,
    pub to: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHandlerConfig {
    pub agent: String,
    pub task: String,
    pub expects: Expectation,
    pub next: Phase,
    /// Autonomous runs may fabricate the expected artifact for this phase.
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rework: Option<Rework>,
}

fn handler(
    agent: &str,
    task: &str,
    artifact: &str,
    field: &str,
    equals: &str,
    next: Phase,
) -> PhaseHandlerConfig {
    PhaseHandlerConfig {
        agent: agent.to_string(),
        task: task.to_string(),
        expects: Expectation {
            artifact: artifact.to_string(),
            field: field.to_string(),
            equals: equals.to_string(),
            required_fields: Vec::new(),
        },
        next,
        synthetic: false,
        rework: None,
    }
}

pub fn default_phases() -> BTreeMap<Phase, PhaseHandlerConfig> {
    let mut m = BTreeMap::new();
    m.insert(
        Phase::Planning,
        handler("planner", "01_plan", "plan.json", "status", "COMPLETE", Phase::Coding),
    );
    m.insert(
        Phase::Coding,
        handler(
            "developer",
            "01_implement",
            "implementation.json",
            "status",
            "COMPLETE",
            Phase::Testing,
        ),
    );
    m.insert(
        Phase::Testing,
        PhaseHandlerConfig {
            synthetic: true,
            ..handler(
                "tester",
                "01_test",
                "test_report.json",
                "status",
                "PASSED",
                Phase::AwaitingQaApproval,
            )
        },
    );
    m.insert(
        Phase::AwaitingQaApproval,
        PhaseHandlerConfig {
            rework: Some(Rework {
                equals: "REJECTED".to_string(),
                to: Phase::Coding,
            }),
            ..handler(
                "qa",
                "01_review",
                "qa_approval.json",
                "decision",
                "APPROVED",
                Phase::Deployment,
            )
        },
    );
    m.insert(
        Phase::Deployment,
        PhaseHandlerConfig {
            synthetic: true,
            ..handler(
                "devops",
                "01_deploy",
                "deployment_report.json",
                "status",
                "DEPLOYED",
                Phase::Production,
            )
        },
    );
    m.insert(
        Phase::Maintenance,
        PhaseHandlerConfig {
            synthetic: true,
            ..handler(
                "maintainer",
                "01_maintain",
                "maintenance_report.json",
                "status",
                "RESOLVED",
                Phase::Production,
            )
        },
    );
    m
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default = "default_phases")]
    pub phases: BTreeMap<Phase, PhaseHandlerConfig>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: 1,
            library: LibraryConfig::default(),
            composer: ComposerConfig::default(),
            phases: default_phases(),
        }
    }

    pub fn handler_for(&self, phase: Phase) -> Option<&PhaseHandlerConfig> {
        self.phases.get(&phase)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(LoomError::NotInitialized {
                root: root.to_path_buf(),
            });
        }
        let data = std::fs::read_to_string(&path)?;
        crate::io::parse_yaml(&path, &data)
    }

    /// Composition works on a bare library without `loom init`.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(LoomError::NotInitialized { .. }) => Ok(Self::new()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, library: &Library) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let agents = library.agents();

        if self.composer.separator.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "composer.separator is empty; sections will run together".to_string(),
            });
        }

        if self.composer.max_prompt_bytes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "composer.max_prompt_bytes is 0; every prompt will warn".to_string(),
            });
        }

        for &phase in Phase::all() {
            if !phase.is_terminal() && !self.phases.contains_key(&phase) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("no handler for phase {phase}; projects there cannot advance"),
                });
            }
        }

        for (phase, h) in &self.phases {
            if phase.is_terminal() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("handler for terminal phase {phase} is never used"),
                });
            }

            if h.next == *phase {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("handler for {phase} transitions to itself"),
                });
            }

            if let Some(rework) = &h.rework {
                if rework.to.is_terminal() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!(
                            "rework for {phase} targets terminal phase {}",
                            rework.to
                        ),
                    });
                }
                if rework.equals == h.expects.equals {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!(
                            "rework sentinel for {phase} equals its advance sentinel '{}'",
                            rework.equals
                        ),
                    });
                }
            }

            if h.expects.field.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("handler for {phase} has an empty expects.field"),
                });
            }

            if !agents.contains(&h.agent) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "handler for {phase} uses agent '{}' which is not in the library",
                        h.agent
                    ),
                });
            } else if !library.tasks(&h.agent).contains(&h.task) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "handler for {phase} uses task '{}' which agent '{}' does not define",
                        h.task, h.agent
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
