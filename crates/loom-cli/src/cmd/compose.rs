use crate::cmd::{open_library, parse_vars};
use crate::output::{print_json, print_warnings};
use anyhow::Context;
use loom_core::{
    composer::{Composer, PromptContext},
    handoff::HandoffRecord,
    io,
    manifest::Manifest,
    workspace::Workspace,
};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn run(
    root: &Path,
    ws: &Workspace,
    agent: &str,
    task: &str,
    project: Option<&str>,
    vars: &[String],
    out: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, library) = open_library(root)?;

    let mut ctx = match project {
        Some(id) => {
            let manifest = Manifest::load(ws, id)?;
            let handoff =
                HandoffRecord::latest_before(&ws.project_dir(id)?, &manifest.history, manifest.phase);
            PromptContext::for_project(id)
                .with_phase(manifest.phase)
                .with_workspace(ws.label())
                .with_handoff(handoff)
        }
        None => PromptContext::new(),
    };
    for (k, v) in parse_vars(vars)? {
        ctx = ctx.with_var(k, v);
    }

    let mut composer = Composer::new(&library, &config.composer);
    let prompt = composer
        .compose(agent, task, &ctx)
        .with_context(|| format!("failed to compose {agent}/{task}"))?;
    print_warnings(&prompt.warnings);

    if let Some(out) = out {
        io::atomic_write(out, prompt.text.as_bytes())
            .with_context(|| format!("failed to write {}", out.display()))?;
        if json {
            print_json(&serde_json::json!({
                "agent": agent,
                "task": task,
                "out": out.display().to_string(),
                "bytes": prompt.text.len(),
                "warnings": prompt.warnings,
            }))?;
        } else {
            println!("Wrote {} bytes to {}", prompt.text.len(), out.display());
        }
    } else if json {
        print_json(&prompt)?;
    } else {
        print!("{}", prompt.text);
        if !prompt.text.is_empty() && !prompt.text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
