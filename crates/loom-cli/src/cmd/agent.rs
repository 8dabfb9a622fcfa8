use crate::cmd::open_library;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum AgentSubcommand {
    /// List agents in the library
    List,
    /// List the tasks an agent defines
    Tasks { agent: String },
}

pub fn run(root: &Path, subcmd: AgentSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AgentSubcommand::List => list(root, json),
        AgentSubcommand::Tasks { agent } => tasks(root, &agent, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, library) = open_library(root)?;
    let agents = library.agents();

    if json {
        let items: Vec<_> = agents
            .iter()
            .map(|a| {
                let description = library.composition(a).ok().and_then(|c| c.description);
                serde_json::json!({
                    "agent": a,
                    "description": description,
                    "tasks": library.tasks(a),
                })
            })
            .collect();
        return print_json(&items);
    }

    if agents.is_empty() {
        println!("No agents under {}", library.agents_dir().display());
        return Ok(());
    }
    let rows: Vec<Vec<String>> = agents
        .iter()
        .map(|a| {
            let description = library
                .composition(a)
                .ok()
                .and_then(|c| c.description)
                .unwrap_or_default();
            vec![a.clone(), library.tasks(a).len().to_string(), description]
        })
        .collect();
    print_table(&["AGENT", "TASKS", "DESCRIPTION"], &rows);
    Ok(())
}

fn tasks(root: &Path, agent: &str, json: bool) -> anyhow::Result<()> {
    let (_, library) = open_library(root)?;
    library.agent_dir(agent)?;

    let mut defs = Vec::new();
    for id in library.tasks(agent) {
        defs.push(library.task(agent, &id)?.meta);
    }

    if json {
        return print_json(&defs);
    }
    if defs.is_empty() {
        println!("Agent '{agent}' has no tasks.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = defs
        .iter()
        .map(|m| {
            vec![
                m.id.clone(),
                m.phase.to_string(),
                m.title.clone().unwrap_or_default(),
                m.requires.join(", "),
            ]
        })
        .collect();
    print_table(&["TASK", "PHASE", "TITLE", "REQUIRES"], &rows);
    Ok(())
}
