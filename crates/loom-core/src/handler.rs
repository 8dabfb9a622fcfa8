//! The phase state machine.
//!
//! One `step` looks at the current phase, checks its expected artifact, and
//! either advances, routes back for rework, refuses to move, or composes a
//! prompt and hands the work to an operator. Steps are idempotent: a repeat
//! with nothing changed on disk writes nothing.

use crate::artifact::{ArtifactStore, GateCheck, GateOutcome};
use crate::composer::{Composer, PromptContext};
use crate::config::{Config, PhaseHandlerConfig};
use crate::delegation::DelegationRequest;
use crate::error::{LoomError, Result};
use crate::handoff::HandoffRecord;
use crate::library::Library;
use crate::manifest::Manifest;
use crate::types::{ExecutionMode, Phase};
use crate::workspace::Workspace;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Terminal {
        phase: Phase,
    },
    Advanced {
        from: Phase,
        to: Phase,
        artifact: String,
    },
    Reworked {
        from: Phase,
        to: Phase,
        artifact: String,
    },
    AwaitingArtifact {
        request: DelegationRequest,
        /// True when the prompt or request file was (re)written.
        created: bool,
        warnings: Vec<String>,
    },
    Blocked {
        phase: Phase,
        reason: String,
    },
}

impl StepOutcome {
    pub fn summary(&self) -> String {
        match self {
            StepOutcome::Terminal { phase } => format!("{phase} is terminal; nothing to do"),
            StepOutcome::Advanced { from, to, artifact } => {
                format!("advanced {from} -> {to} ({artifact})")
            }
            StepOutcome::Reworked { from, to, artifact } => {
                format!("rework requested: {from} -> {to} ({artifact})")
            }
            StepOutcome::AwaitingArtifact { request, .. } => format!(
                "awaiting {} from {}/{}",
                request.expected_artifact, request.agent, request.task
            ),
            StepOutcome::Blocked { reason, .. } => reason.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseEngine
// ---------------------------------------------------------------------------

pub struct PhaseEngine<'a> {
    config: &'a Config,
    library: &'a Library,
    ws: &'a Workspace,
    vars: BTreeMap<String, String>,
}

impl<'a> PhaseEngine<'a> {
    pub fn new(config: &'a Config, library: &'a Library, ws: &'a Workspace) -> Self {
        Self {
            config,
            library,
            ws,
            vars: BTreeMap::new(),
        }
    }

    /// Extra operator-supplied placeholder values for composed prompts.
    pub fn with_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub fn step(&self, project: &str, mode: ExecutionMode) -> Result<StepOutcome> {
        let mut manifest = Manifest::load(self.ws, project)?;
        let phase = manifest.phase;
        if phase.is_terminal() {
            return Ok(StepOutcome::Terminal { phase });
        }

        let Some(handler) = self.config.handler_for(phase) else {
            return self.block(&mut manifest, format!("no handler configured for {phase}"));
        };

        let store = ArtifactStore::new(self.ws, project)?;
        let mut outcome = self.gate(&manifest, &store, handler)?;

        if matches!(outcome, GateOutcome::Missing { .. }) && mode == ExecutionMode::Autonomous {
            if handler.synthetic {
                self.write_synthetic(&store, phase, handler)?;
                outcome = self.gate(&manifest, &store, handler)?;
            } else {
                tracing::info!(
                    project,
                    phase = %phase,
                    "no in-process executor for this phase; delegating"
                );
            }
        }

        match outcome {
            GateOutcome::Satisfied { path } => {
                self.advance(&mut manifest, &store, handler, handler.next, &path)?;
                Ok(StepOutcome::Advanced {
                    from: phase,
                    to: handler.next,
                    artifact: path,
                })
            }
            GateOutcome::Rework { path, to } => {
                self.advance(&mut manifest, &store, handler, to, &path)?;
                Ok(StepOutcome::Reworked {
                    from: phase,
                    to,
                    artifact: path,
                })
            }
            GateOutcome::Missing { .. } => self.delegate(&mut manifest, &store, handler),
            blocked => {
                let reason = blocked.describe();
                tracing::warn!(project, phase = %phase, %reason, "transition blocked");
                self.block(&mut manifest, reason)
            }
        }
    }

    /// Evaluate the current phase's artifact. Content already consumed by an
    /// earlier visit to the phase counts as missing, so re-entering a phase
    /// after rework or a new maintenance cycle waits for fresh work.
    fn gate(
        &self,
        manifest: &Manifest,
        store: &ArtifactStore,
        handler: &PhaseHandlerConfig,
    ) -> Result<GateOutcome> {
        let phase = manifest.phase;
        let outcome = GateCheck::evaluate(store, phase, &handler.expects, handler.rework.as_ref())?;
        if matches!(outcome, GateOutcome::Missing { .. }) {
            return Ok(outcome);
        }
        let current = store.reference(phase, &handler.expects.artifact)?;
        if manifest.has_recorded(phase, &current) {
            tracing::debug!(phase = %phase, path = %current.path, "artifact already consumed");
            return Ok(GateOutcome::Missing { path: current.path });
        }
        Ok(outcome)
    }

    fn block(&self, manifest: &mut Manifest, reason: String) -> Result<StepOutcome> {
        if manifest.set_status(reason.clone()) {
            manifest.save(self.ws)?;
        }
        Ok(StepOutcome::Blocked {
            phase: manifest.phase,
            reason,
        })
    }

    fn advance(
        &self,
        manifest: &mut Manifest,
        store: &ArtifactStore,
        handler: &PhaseHandlerConfig,
        to: Phase,
        artifact_path: &str,
    ) -> Result<()> {
        let from = manifest.phase;
        let name = &handler.expects.artifact;
        manifest.record_artifact(from, store.reference(from, name)?);

        let artifact = store.read(from, name)?;
        HandoffRecord::from_artifact(from, &handler.agent, &artifact).save(store.project_dir())?;

        manifest.transition(to, Some(format!("gate satisfied by {artifact_path}")));
        manifest.set_status(format!("entered {to}"));
        manifest.save(self.ws)?;
        tracing::info!(project = %manifest.project_id, from = %from, to = %to, "phase transition");
        Ok(())
    }

    fn delegate(
        &self,
        manifest: &mut Manifest,
        store: &ArtifactStore,
        handler: &PhaseHandlerConfig,
    ) -> Result<StepOutcome> {
        let phase = manifest.phase;
        let project_dir = store.project_dir();
        let artifact_path = store.path(phase, &handler.expects.artifact)?;
        let artifact_dir = artifact_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| project_dir.to_path_buf());

        let handoff = HandoffRecord::latest_before(project_dir, &manifest.history, phase);
        let mut ctx = PromptContext::for_project(manifest.project_id.clone())
            .with_phase(phase)
            .with_workspace(self.ws.label())
            .with_handoff(handoff);
        for (k, v) in &self.vars {
            ctx = ctx.with_var(k, v);
        }
        ctx = ctx
            .with_var("artifact_path", artifact_path.display().to_string())
            .with_var("artifact_dir", artifact_dir.display().to_string());

        let mut composer = Composer::new(self.library, &self.config.composer);
        let prompt = composer.compose(&handler.agent, &handler.task, &ctx)?;

        let request = DelegationRequest::new(self.ws, &manifest.project_id, phase, handler);
        let (request, created) = request.publish(project_dir, &prompt.text)?;

        let status = format!(
            "awaiting {} from {}/{}",
            request.expected_artifact, handler.agent, handler.task
        );
        if manifest.set_status(status) {
            manifest.save(self.ws)?;
        }
        Ok(StepOutcome::AwaitingArtifact {
            request,
            created,
            warnings: prompt.warnings,
        })
    }

    fn write_synthetic(
        &self,
        store: &ArtifactStore,
        phase: Phase,
        handler: &PhaseHandlerConfig,
    ) -> Result<()> {
        let mut artifact = json!({
            "synthetic": true,
            "summary": format!("synthetic {phase} artifact; no work was performed"),
            "generated_at": Utc::now().to_rfc3339(),
        });
        for field in &handler.expects.required_fields {
            set_field(&mut artifact, field, Value::Null, false);
        }
        set_field(
            &mut artifact,
            &handler.expects.field,
            Value::String(handler.expects.equals.clone()),
            true,
        );
        let path = store.write(phase, &handler.expects.artifact, &artifact)?;
        tracing::warn!(
            phase = %phase,
            path = %path.display(),
            "fabricated synthetic artifact in autonomous mode"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // External triggers
    // ---------------------------------------------------------------------------

    /// PRODUCTION -> MAINTENANCE.
    pub fn trigger_maintenance(&self, project: &str, reason: &str) -> Result<Manifest> {
        let mut manifest = Manifest::load(self.ws, project)?;
        if manifest.phase != Phase::Production {
            return Err(LoomError::InvalidTransition {
                from: manifest.phase.to_string(),
                to: Phase::Maintenance.to_string(),
                reason: "maintenance can only be triggered from PRODUCTION".to_string(),
            });
        }
        manifest.transition(Phase::Maintenance, Some(reason.to_string()));
        manifest.set_status(format!("maintenance: {reason}"));
        manifest.save(self.ws)?;
        tracing::info!(project, "maintenance triggered");
        Ok(manifest)
    }

    /// Write the QA decision artifact. The next step applies it.
    pub fn record_decision(
        &self,
        project: &str,
        approved: bool,
        by: Option<&str>,
        reason: Option<&str>,
    ) -> Result<PathBuf> {
        let manifest = Manifest::load(self.ws, project)?;
        let phase = Phase::AwaitingQaApproval;
        if manifest.phase != phase {
            return Err(LoomError::InvalidTransition {
                from: manifest.phase.to_string(),
                to: phase.to_string(),
                reason: format!("a QA decision can only be recorded in {phase}"),
            });
        }
        let Some(handler) = self.config.handler_for(phase) else {
            return Err(LoomError::InvalidTransition {
                from: phase.to_string(),
                to: phase.to_string(),
                reason: format!("no handler configured for {phase}"),
            });
        };

        let decision = if approved {
            handler.expects.equals.clone()
        } else {
            handler
                .rework
                .as_ref()
                .map(|r| r.equals.clone())
                .unwrap_or_else(|| "REJECTED".to_string())
        };

        let mut artifact = json!({
            "decided_at": Utc::now().to_rfc3339(),
        });
        if let Some(by) = by {
            artifact["approved_by"] = Value::String(by.to_string());
        }
        if let Some(reason) = reason {
            artifact["notes"] = Value::String(reason.to_string());
            artifact["summary"] = Value::String(reason.to_string());
        }
        for field in &handler.expects.required_fields {
            set_field(&mut artifact, field, Value::Null, false);
        }
        set_field(&mut artifact, &handler.expects.field, Value::String(decision), true);

        let store = ArtifactStore::new(self.ws, project)?;
        store.write(phase, &handler.expects.artifact, &artifact)
    }
}

/// Set a dotted field, creating intermediate objects. Existing values are
/// kept unless `overwrite` is set.
fn set_field(target: &mut Value, field: &str, value: Value, overwrite: bool) {
    let mut segments: Vec<&str> = field.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut cursor = target;
    for seg in segments {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Some(obj) = cursor.as_object_mut() else {
            return;
        };
        cursor = obj
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Some(obj) = cursor.as_object_mut() {
        if overwrite || !obj.contains_key(last) {
            obj.insert(last.to_string(), value);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::paths;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// A library with one agent/task per default handler.
    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        for handler in crate::config::default_phases().values() {
            let a = &handler.agent;
            let t = &handler.task;
            write(
                dir.path(),
                &format!("agents/{a}/_composition.yaml"),
                "sections:\n  - kind: core\n    path: core.md\n  - kind: task\n",
            );
            write(dir.path(), &format!("agents/{a}/core.md"), "You are the ${agent}.");
            write(
                dir.path(),
                &format!("agents/{a}/tasks/{t}.md"),
                "Work on ${project_id} in ${phase}. Write ${artifact_path}.",
            );
            write(
                dir.path(),
                &format!("agents/{a}/tasks/{t}.yaml"),
                &format!("id: {t}\nphase: 1\n"),
            );
        }
        dir
    }

    struct Env {
        config: Config,
        library: Library,
        ws: Workspace,
    }

    fn env(dir: &TempDir) -> Env {
        Env {
            config: Config::new(),
            library: Library::open(dir.path(), &LibraryConfig::default()),
            ws: Workspace::root_workspace(dir.path()),
        }
    }

    fn put(env: &Env, phase: Phase, name: &str, value: Value) {
        ArtifactStore::new(&env.ws, "abc")
            .unwrap()
            .write(phase, name, &value)
            .unwrap();
    }

    #[test]
    fn delegated_step_writes_prompt_and_request() {
        let dir = fixture();
        let env = env(&dir);
        Manifest::create(&env.ws, "abc").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        match engine.step("abc", ExecutionMode::Delegated).unwrap() {
            StepOutcome::AwaitingArtifact { request, created, .. } => {
                assert!(created);
                assert_eq!(request.agent, "planner");
                assert_eq!(request.expected_artifact, "artifacts/PLANNING/plan.json");
            }
            other => panic!("expected AwaitingArtifact, got {other:?}"),
        }

        let project_dir = env.ws.project_dir("abc").unwrap();
        let prompt =
            std::fs::read_to_string(paths::prompt_path(&project_dir, Phase::Planning)).unwrap();
        assert!(prompt.contains("Work on abc in PLANNING"));
        assert!(prompt.contains("plan.json"));
        let manifest = Manifest::load(&env.ws, "abc").unwrap();
        assert!(manifest.status.starts_with("awaiting"));
    }

    #[test]
    fn repeated_step_is_idempotent() {
        let dir = fixture();
        let env = env(&dir);
        Manifest::create(&env.ws, "abc").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        let first = engine.step("abc", ExecutionMode::Delegated).unwrap();
        let manifest_path = paths::manifest_path(&env.ws.project_dir("abc").unwrap());
        let before = std::fs::read(&manifest_path).unwrap();

        let second = engine.step("abc", ExecutionMode::Delegated).unwrap();
        match (first, second) {
            (
                StepOutcome::AwaitingArtifact { request: a, .. },
                StepOutcome::AwaitingArtifact {
                    request: b,
                    created,
                    ..
                },
            ) => {
                assert!(!created);
                assert_eq!(a.request_id, b.request_id);
            }
            other => panic!("unexpected outcomes {other:?}"),
        }
        assert_eq!(std::fs::read(&manifest_path).unwrap(), before);
    }

    #[test]
    fn satisfied_gate_advances_and_writes_handoff() {
        let dir = fixture();
        let env = env(&dir);
        Manifest::create(&env.ws, "abc").unwrap();
        put(
            &env,
            Phase::Planning,
            "plan.json",
            json!({"status": "COMPLETE", "summary": "planned", "next_steps": ["build it"]}),
        );
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        match engine.step("abc", ExecutionMode::Delegated).unwrap() {
            StepOutcome::Advanced { from, to, .. } => {
                assert_eq!((from, to), (Phase::Planning, Phase::Coding));
            }
            other => panic!("expected Advanced, got {other:?}"),
        }
        let manifest = Manifest::load(&env.ws, "abc").unwrap();
        assert_eq!(manifest.phase, Phase::Coding);
        assert_eq!(manifest.artifacts[&Phase::Planning].len(), 1);
        let project_dir = env.ws.project_dir("abc").unwrap();
        assert!(HandoffRecord::load(&project_dir, Phase::Planning)
            .unwrap()
            .is_some());

        // The next prompt carries the handoff.
        engine.step("abc", ExecutionMode::Delegated).unwrap();
        let prompt =
            std::fs::read_to_string(paths::prompt_path(&project_dir, Phase::Coding)).unwrap();
        assert!(prompt.contains("## Handoff from PLANNING (planner)"));
        assert!(prompt.contains("- build it"));
    }

    #[test]
    fn mismatched_sentinel_blocks() {
        let dir = fixture();
        let env = env(&dir);
        Manifest::create(&env.ws, "abc").unwrap();
        put(&env, Phase::Planning, "plan.json", json!({"status": "DRAFT"}));
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        match engine.step("abc", ExecutionMode::Delegated).unwrap() {
            StepOutcome::Blocked { phase, reason } => {
                assert_eq!(phase, Phase::Planning);
                assert!(reason.contains("DRAFT"));
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert_eq!(Manifest::load(&env.ws, "abc").unwrap().phase, Phase::Planning);
    }

    #[test]
    fn autonomous_mode_fabricates_synthetic_artifacts() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        m.phase = Phase::Testing;
        m.save(&env.ws).unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        match engine.step("abc", ExecutionMode::Autonomous).unwrap() {
            StepOutcome::Advanced { to, .. } => assert_eq!(to, Phase::AwaitingQaApproval),
            other => panic!("expected Advanced, got {other:?}"),
        }
        let store = ArtifactStore::new(&env.ws, "abc").unwrap();
        let artifact = store.read(Phase::Testing, "test_report.json").unwrap();
        assert_eq!(artifact["synthetic"], true);
        assert_eq!(artifact["status"], "PASSED");
    }

    #[test]
    fn autonomous_mode_delegates_non_synthetic_phases() {
        let dir = fixture();
        let env = env(&dir);
        Manifest::create(&env.ws, "abc").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);
        assert!(matches!(
            engine.step("abc", ExecutionMode::Autonomous).unwrap(),
            StepOutcome::AwaitingArtifact { .. }
        ));
    }

    #[test]
    fn rejection_routes_back_to_coding() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        m.phase = Phase::AwaitingQaApproval;
        m.save(&env.ws).unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        engine
            .record_decision("abc", false, Some("sam"), Some("flaky tests"))
            .unwrap();
        match engine.step("abc", ExecutionMode::Delegated).unwrap() {
            StepOutcome::Reworked { to, .. } => assert_eq!(to, Phase::Coding),
            other => panic!("expected Reworked, got {other:?}"),
        }
    }

    #[test]
    fn rework_waits_for_a_fresh_implementation() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        m.phase = Phase::Coding;
        m.save(&env.ws).unwrap();
        put(&env, Phase::Coding, "implementation.json", json!({"status": "COMPLETE"}));
        put(&env, Phase::Testing, "test_report.json", json!({"status": "PASSED"}));
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        let step = || engine.step("abc", ExecutionMode::Delegated).unwrap();
        assert!(matches!(step(), StepOutcome::Advanced { to: Phase::Testing, .. }));
        assert!(matches!(
            step(),
            StepOutcome::Advanced {
                to: Phase::AwaitingQaApproval,
                ..
            }
        ));
        engine
            .record_decision("abc", false, None, Some("flaky"))
            .unwrap();
        assert!(matches!(step(), StepOutcome::Reworked { to: Phase::Coding, .. }));

        // The implementation from the first pass does not satisfy the gate again.
        match step() {
            StepOutcome::AwaitingArtifact { request, .. } => {
                assert_eq!(request.expected_artifact, "artifacts/CODING/implementation.json");
            }
            other => panic!("expected AwaitingArtifact, got {other:?}"),
        }
        assert_eq!(Manifest::load(&env.ws, "abc").unwrap().phase, Phase::Coding);

        put(
            &env,
            Phase::Coding,
            "implementation.json",
            json!({"status": "COMPLETE", "summary": "fixed the flaky tests"}),
        );
        assert!(matches!(step(), StepOutcome::Advanced { to: Phase::Testing, .. }));
        // Stale test report and QA decision both wait as well.
        assert!(matches!(step(), StepOutcome::AwaitingArtifact { .. }));
        put(
            &env,
            Phase::Testing,
            "test_report.json",
            json!({"status": "PASSED", "summary": "rerun"}),
        );
        assert!(matches!(
            step(),
            StepOutcome::Advanced {
                to: Phase::AwaitingQaApproval,
                ..
            }
        ));
        assert!(matches!(step(), StepOutcome::AwaitingArtifact { .. }));
    }

    #[test]
    fn second_maintenance_cycle_waits_for_a_new_report() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        m.phase = Phase::Production;
        m.save(&env.ws).unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        engine.trigger_maintenance("abc", "pager").unwrap();
        put(
            &env,
            Phase::Maintenance,
            "maintenance_report.json",
            json!({"status": "RESOLVED"}),
        );
        assert!(matches!(
            engine.step("abc", ExecutionMode::Delegated).unwrap(),
            StepOutcome::Advanced {
                to: Phase::Production,
                ..
            }
        ));

        engine.trigger_maintenance("abc", "pager again").unwrap();
        assert!(matches!(
            engine.step("abc", ExecutionMode::Delegated).unwrap(),
            StepOutcome::AwaitingArtifact { .. }
        ));
        assert_eq!(
            Manifest::load(&env.ws, "abc").unwrap().phase,
            Phase::Maintenance
        );
    }

    #[test]
    fn corrupt_handoff_still_delegates() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        m.transition(Phase::Coding, None);
        m.save(&env.ws).unwrap();
        let project_dir = env.ws.project_dir("abc").unwrap();
        let handoff = paths::handoff_path(&project_dir, Phase::Planning);
        std::fs::create_dir_all(handoff.parent().unwrap()).unwrap();
        std::fs::write(&handoff, "{ not json").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        assert!(matches!(
            engine.step("abc", ExecutionMode::Delegated).unwrap(),
            StepOutcome::AwaitingArtifact { .. }
        ));
        let prompt =
            std::fs::read_to_string(paths::prompt_path(&project_dir, Phase::Coding)).unwrap();
        assert!(!prompt.contains("## Handoff"));
    }

    #[test]
    fn approval_advances_to_deployment() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        m.phase = Phase::AwaitingQaApproval;
        m.save(&env.ws).unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);

        let path = engine.record_decision("abc", true, None, None).unwrap();
        assert!(path.ends_with("artifacts/AWAITING_QA_APPROVAL/qa_approval.json"));
        assert!(matches!(
            engine.step("abc", ExecutionMode::Delegated).unwrap(),
            StepOutcome::Advanced {
                to: Phase::Deployment,
                ..
            }
        ));
    }

    #[test]
    fn decision_outside_qa_is_rejected() {
        let dir = fixture();
        let env = env(&dir);
        Manifest::create(&env.ws, "abc").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);
        assert!(matches!(
            engine.record_decision("abc", true, None, None),
            Err(LoomError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn production_is_terminal_until_maintenance() {
        let dir = fixture();
        let env = env(&dir);
        let mut m = Manifest::create(&env.ws, "abc").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);
        assert!(matches!(
            engine.trigger_maintenance("abc", "pager"),
            Err(LoomError::InvalidTransition { .. })
        ));

        m.phase = Phase::Production;
        m.save(&env.ws).unwrap();
        let before = std::fs::read(paths::manifest_path(&env.ws.project_dir("abc").unwrap()))
            .unwrap();
        assert!(matches!(
            engine.step("abc", ExecutionMode::Autonomous).unwrap(),
            StepOutcome::Terminal { .. }
        ));
        let after = std::fs::read(paths::manifest_path(&env.ws.project_dir("abc").unwrap()))
            .unwrap();
        assert_eq!(before, after);

        let m = engine.trigger_maintenance("abc", "pager").unwrap();
        assert_eq!(m.phase, Phase::Maintenance);
        // Maintenance is synthetic, so an autonomous step returns to production.
        assert!(matches!(
            engine.step("abc", ExecutionMode::Autonomous).unwrap(),
            StepOutcome::Advanced {
                to: Phase::Production,
                ..
            }
        ));
    }

    #[test]
    fn missing_handler_blocks() {
        let dir = fixture();
        let mut env = env(&dir);
        env.config.phases.remove(&Phase::Planning);
        Manifest::create(&env.ws, "abc").unwrap();
        let engine = PhaseEngine::new(&env.config, &env.library, &env.ws);
        assert!(matches!(
            engine.step("abc", ExecutionMode::Delegated).unwrap(),
            StepOutcome::Blocked { .. }
        ));
    }

    #[test]
    fn set_field_builds_nested_objects() {
        let mut v = json!({"keep": 1});
        set_field(&mut v, "result.status", json!("OK"), true);
        set_field(&mut v, "keep", json!(2), false);
        assert_eq!(v, json!({"keep": 1, "result": {"status": "OK"}}));
    }
}
