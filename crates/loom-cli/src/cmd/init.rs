use crate::output::print_json;
use anyhow::Context;
use loom_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to read existing config")?;

    let dirs = [
        paths::LOOM_DIR,
        config.library.agents_dir.as_str(),
        config.library.knowledge_dir.as_str(),
        paths::PROJECTS_DIR,
    ];
    let mut created = Vec::new();
    for dir in dirs {
        let p = root.join(dir);
        if !p.is_dir() {
            io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
            created.push(format!("{dir}/"));
        }
    }

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        config.save(root).context("failed to write config.yaml")?;
        created.push(paths::CONFIG_FILE.to_string());
    }

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": created,
        }))?;
    } else {
        println!("Initialized loom in: {}", root.display());
        if created.is_empty() {
            println!("  nothing to do; already initialized");
        }
        for item in &created {
            println!("  created: {item}");
        }
    }
    Ok(())
}
