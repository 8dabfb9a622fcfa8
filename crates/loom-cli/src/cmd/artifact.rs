use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use loom_core::{artifact::ArtifactStore, io, manifest::Manifest, types::Phase, workspace::Workspace};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ArtifactSubcommand {
    /// List artifacts per phase
    List { project: String },
    /// Print one artifact
    Show {
        project: String,
        phase: String,
        name: String,
    },
    /// Store a JSON file as a phase artifact
    Put {
        project: String,
        phase: String,
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
}

pub fn run(ws: &Workspace, subcmd: ArtifactSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ArtifactSubcommand::List { project } => list(ws, &project, json),
        ArtifactSubcommand::Show {
            project,
            phase,
            name,
        } => show(ws, &project, phase.parse::<Phase>()?, &name),
        ArtifactSubcommand::Put {
            project,
            phase,
            name,
            file,
        } => put(ws, &project, phase.parse::<Phase>()?, &name, &file, json),
    }
}

/// Artifact commands operate on existing projects only.
fn open(ws: &Workspace, project: &str) -> anyhow::Result<ArtifactStore> {
    Manifest::load(ws, project)?;
    Ok(ArtifactStore::new(ws, project)?)
}

fn list(ws: &Workspace, project: &str, json: bool) -> anyhow::Result<()> {
    let all = open(ws, project)?.list_all()?;
    if json {
        return print_json(&all);
    }
    if all.is_empty() {
        println!("No artifacts for '{project}'.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = all
        .iter()
        .flat_map(|(phase, names)| names.iter().map(move |n| vec![phase.to_string(), n.clone()]))
        .collect();
    print_table(&["PHASE", "NAME"], &rows);
    Ok(())
}

fn show(ws: &Workspace, project: &str, phase: Phase, name: &str) -> anyhow::Result<()> {
    let value = open(ws, project)?
        .read(phase, name)
        .with_context(|| format!("failed to read {phase}/{name}"))?;
    print_json(&value)
}

fn put(
    ws: &Workspace,
    project: &str,
    phase: Phase,
    name: &str,
    file: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let store = open(ws, project)?;
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value = io::parse_json(file, &data)?;
    let path = store.write(phase, name, &value)?;

    if json {
        print_json(&serde_json::json!({
            "project": project,
            "phase": phase,
            "path": store.relative(phase, name),
        }))?;
    } else {
        println!("Stored {}", path.display());
    }
    Ok(())
}
