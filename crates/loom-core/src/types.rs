use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    Coding,
    Testing,
    AwaitingQaApproval,
    Deployment,
    Production,
    Maintenance,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Planning,
            Phase::Coding,
            Phase::Testing,
            Phase::AwaitingQaApproval,
            Phase::Deployment,
            Phase::Production,
            Phase::Maintenance,
        ]
    }

    pub fn names() -> Vec<&'static str> {
        Self::all().iter().map(|p| p.as_str()).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "PLANNING",
            Phase::Coding => "CODING",
            Phase::Testing => "TESTING",
            Phase::AwaitingQaApproval => "AWAITING_QA_APPROVAL",
            Phase::Deployment => "DEPLOYMENT",
            Phase::Production => "PRODUCTION",
            Phase::Maintenance => "MAINTENANCE",
        }
    }

    /// PRODUCTION only leaves via an explicit maintenance trigger.
    pub fn is_terminal(self) -> bool {
        self == Phase::Production
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = crate::error::LoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Phase::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| crate::error::LoomError::InvalidPhase(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ExecutionMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Compose the prompt and hand it to an external operator.
    #[default]
    Delegated,
    /// Fabricate placeholder artifacts for handlers marked `synthetic`;
    /// everything else still delegates.
    Autonomous,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Delegated => "delegated",
            ExecutionMode::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FragmentKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Core,
    Knowledge,
    Task,
    Gate,
    Fragment,
}

impl FragmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Core => "core",
            FragmentKind::Knowledge => "knowledge",
            FragmentKind::Task => "task",
            FragmentKind::Gate => "gate",
            FragmentKind::Fragment => "fragment",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
