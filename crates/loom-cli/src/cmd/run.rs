use crate::cmd::{open_library, parse_vars};
use crate::output::{print_json, print_warnings};
use anyhow::Context;
use loom_core::{
    delegation::{render_banner, wait_for_file},
    handler::{PhaseEngine, StepOutcome},
    io,
    types::ExecutionMode,
    workspace::Workspace,
};
use std::path::Path;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn run(
    root: &Path,
    ws: &Workspace,
    project: &str,
    mode: ExecutionMode,
    wait: Option<u64>,
    vars: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let (config, library) = open_library(root)?;
    let engine = PhaseEngine::new(&config, &library, ws).with_vars(parse_vars(vars)?);

    let mut outcome = engine
        .step(project, mode)
        .with_context(|| format!("step failed for project '{project}'"))?;

    let pending = match &outcome {
        StepOutcome::AwaitingArtifact { request, .. } => Some(request.expected_artifact.clone()),
        _ => None,
    };
    if let (Some(secs), Some(expected)) = (wait, pending) {
        let artifact = ws.project_dir(project)?.join(&expected);
        // A file already on disk was consumed by an earlier visit; wait for new content.
        let baseline = if artifact.is_file() {
            Some(io::sha256_file(&artifact)?)
        } else {
            None
        };
        if !json {
            print_banner(&outcome)?;
            eprintln!("waiting up to {secs}s for {expected}");
        }
        if wait_for_file(
            &artifact,
            baseline.as_deref(),
            Duration::from_secs(secs),
            POLL_INTERVAL,
        )? {
            outcome = engine
                .step(project, mode)
                .with_context(|| format!("step failed for project '{project}'"))?;
        } else if !json {
            eprintln!("timed out; the request stays open");
            return Ok(());
        }
    }

    if json {
        return print_json(&outcome);
    }
    print_banner(&outcome)?;
    println!("{}", outcome.summary());
    Ok(())
}

fn print_banner(outcome: &StepOutcome) -> anyhow::Result<()> {
    if let StepOutcome::AwaitingArtifact {
        request, warnings, ..
    } = outcome
    {
        print_warnings(warnings);
        print!("{}", render_banner(request)?);
    }
    Ok(())
}
