use crate::cmd::open_library;
use crate::output::print_json;
use loom_core::{handler::PhaseEngine, workspace::Workspace};
use std::path::Path;

pub fn run(
    root: &Path,
    ws: &Workspace,
    project: &str,
    reason: &str,
    json: bool,
) -> anyhow::Result<()> {
    let (config, library) = open_library(root)?;
    let manifest = PhaseEngine::new(&config, &library, ws).trigger_maintenance(project, reason)?;
    if json {
        print_json(&manifest)?;
    } else {
        println!("{project}: PRODUCTION -> {} ({reason})", manifest.phase);
    }
    Ok(())
}
