use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use loom_core::{manifest::Manifest, workspace::Workspace};

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a project manifest in PLANNING
    Create { project: String },
    /// Show a project's manifest
    Show { project: String },
    /// List projects in the workspace
    List,
}

pub fn run(ws: &Workspace, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::Create { project } => create(ws, &project, json),
        ProjectSubcommand::Show { project } => show(ws, &project, json),
        ProjectSubcommand::List => list(ws, json),
    }
}

fn create(ws: &Workspace, project: &str, json: bool) -> anyhow::Result<()> {
    let manifest = Manifest::create(ws, project)
        .with_context(|| format!("failed to create project '{project}'"))?;
    if json {
        print_json(&manifest)?;
    } else {
        println!(
            "Created project '{project}' in workspace {} (phase {})",
            ws.label(),
            manifest.phase
        );
    }
    Ok(())
}

fn show(ws: &Workspace, project: &str, json: bool) -> anyhow::Result<()> {
    let manifest = Manifest::load(ws, project)?;
    let missing = manifest.missing_artifact_files(ws)?;

    if json {
        let mut value = serde_json::to_value(&manifest)?;
        value["missing_artifact_files"] = serde_json::json!(missing);
        return print_json(&value);
    }

    println!("Project:   {}", manifest.project_id);
    println!("Workspace: {}", ws.label());
    println!("Phase:     {}", manifest.phase);
    println!("Status:    {}", manifest.status);
    println!("Updated:   {}", manifest.updated_at.to_rfc3339());

    if !manifest.artifacts.is_empty() {
        println!("\nArtifacts:");
        let rows: Vec<Vec<String>> = manifest
            .artifacts
            .iter()
            .flat_map(|(phase, refs)| {
                refs.iter().map(move |r| {
                    vec![
                        phase.to_string(),
                        r.path.clone(),
                        r.sha256.chars().take(12).collect(),
                    ]
                })
            })
            .collect();
        print_table(&["PHASE", "PATH", "SHA256"], &rows);
    }

    if !manifest.history.is_empty() {
        println!("\nHistory:");
        for t in &manifest.history {
            let note = t.note.as_deref().map(|n| format!(" ({n})")).unwrap_or_default();
            println!("  {} {} -> {}{note}", t.at.to_rfc3339(), t.from, t.to);
        }
    }

    for path in &missing {
        eprintln!("warning: recorded artifact {path} no longer exists");
    }
    Ok(())
}

fn list(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let mut manifests = Vec::new();
    for id in ws.list_projects()? {
        manifests.push(Manifest::load(ws, &id)?);
    }

    if json {
        let items: Vec<_> = manifests
            .iter()
            .map(|m| {
                serde_json::json!({
                    "project_id": m.project_id,
                    "phase": m.phase,
                    "status": m.status,
                })
            })
            .collect();
        return print_json(&items);
    }

    if manifests.is_empty() {
        println!("No projects in workspace {}.", ws.label());
        return Ok(());
    }
    let rows: Vec<Vec<String>> = manifests
        .iter()
        .map(|m| vec![m.project_id.clone(), m.phase.to_string(), m.status.clone()])
        .collect();
    print_table(&["PROJECT", "PHASE", "STATUS"], &rows);
    Ok(())
}
