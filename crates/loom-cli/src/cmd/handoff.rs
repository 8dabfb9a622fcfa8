use crate::output::print_json;
use clap::Subcommand;
use loom_core::{handoff::HandoffRecord, manifest::Manifest, types::Phase, workspace::Workspace};

#[derive(Subcommand)]
pub enum HandoffSubcommand {
    /// Show the handoff left by a phase (default: the one leading into the current phase)
    Show {
        project: String,
        #[arg(long)]
        phase: Option<String>,
    },
}

pub fn run(ws: &Workspace, subcmd: HandoffSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        HandoffSubcommand::Show { project, phase } => show(ws, &project, phase.as_deref(), json),
    }
}

fn show(ws: &Workspace, project: &str, phase: Option<&str>, json: bool) -> anyhow::Result<()> {
    let manifest = Manifest::load(ws, project)?;
    let project_dir = ws.project_dir(project)?;
    let record = match phase {
        Some(p) => HandoffRecord::load(&project_dir, p.parse::<Phase>()?)?,
        None => HandoffRecord::latest_before(&project_dir, &manifest.history, manifest.phase),
    };

    match (record, json) {
        (Some(r), true) => print_json(&r)?,
        (Some(r), false) => print!("{}", r.render_markdown()),
        (None, true) => print_json(&serde_json::Value::Null)?,
        (None, false) => println!("No handoff recorded."),
    }
    Ok(())
}
