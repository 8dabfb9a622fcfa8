pub mod agent;
pub mod approve;
pub mod artifact;
pub mod compose;
pub mod config;
pub mod handoff;
pub mod init;
pub mod maintain;
pub mod project;
pub mod run;

use anyhow::Context;
use loom_core::{config::Config, library::Library};
use std::collections::BTreeMap;
use std::path::Path;

/// Config plus the library it points at. A root without `.loom/` uses the
/// defaults.
pub fn open_library(root: &Path) -> anyhow::Result<(Config, Library)> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    let library = Library::open(root, &config.library);
    Ok((config, library))
}

/// Parse repeated `--var key=value` flags.
pub fn parse_vars(raw: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("invalid --var '{item}': expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("invalid --var '{item}': empty key");
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_vars_splits_on_first_equals() {
        let vars = parse_vars(&["repo=a=b".to_string(), " owner =sam".to_string()]).unwrap();
        assert_eq!(vars["repo"], "a=b");
        assert_eq!(vars["owner"], "sam");
    }

    #[test]
    fn parse_vars_rejects_bad_input() {
        assert!(parse_vars(&["novalue".to_string()]).is_err());
        assert!(parse_vars(&["=x".to_string()]).is_err());
    }
}
