use crate::cmd::open_library;
use crate::output::print_json;
use anyhow::Context;
use loom_core::{handler::PhaseEngine, workspace::Workspace};
use std::path::Path;

pub fn run(
    root: &Path,
    ws: &Workspace,
    project: &str,
    approved: bool,
    by: Option<&str>,
    reason: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, library) = open_library(root)?;
    let engine = PhaseEngine::new(&config, &library, ws);
    let path = engine
        .record_decision(project, approved, by, reason)
        .with_context(|| format!("failed to record decision for '{project}'"))?;

    let decision = if approved { "approved" } else { "rejected" };
    if json {
        print_json(&serde_json::json!({
            "project": project,
            "decision": decision,
            "by": by,
            "path": path.display().to_string(),
        }))?;
    } else {
        println!("Recorded: {project} {decision}. Run `loom run {project}` to apply it.");
    }
    Ok(())
}
