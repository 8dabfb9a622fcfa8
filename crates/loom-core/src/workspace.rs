//! Project storage roots.
//!
//! A workspace is always passed explicitly. `name: None` is the root
//! workspace (`<root>/projects`); a named workspace lives under
//! `<root>/workspaces/<name>/projects`.

use crate::error::Result;
use crate::paths;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    name: Option<String>,
}

impl Workspace {
    pub fn root_workspace(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            name: None,
        }
    }

    pub fn named(root: &Path, name: &str) -> Result<Self> {
        paths::validate_identifier("workspace", name)?;
        Ok(Self {
            root: root.to_path_buf(),
            name: Some(name.to_string()),
        })
    }

    /// `None` or an empty name selects the root workspace.
    pub fn resolve(root: &Path, name: Option<&str>) -> Result<Self> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => Self::named(root, n),
            None => Ok(Self::root_workspace(root)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Display label: the workspace name, or `root`.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("root")
    }

    pub fn projects_dir(&self) -> PathBuf {
        match &self.name {
            Some(name) => self
                .root
                .join(paths::WORKSPACES_DIR)
                .join(name)
                .join(paths::PROJECTS_DIR),
            None => self.root.join(paths::PROJECTS_DIR),
        }
    }

    pub fn project_dir(&self, project: &str) -> Result<PathBuf> {
        paths::validate_identifier("project", project)?;
        Ok(self.projects_dir().join(project))
    }

    /// Sorted ids of projects that have a manifest.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        let dir = self.projects_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut projects = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && paths::manifest_path(&entry.path()).is_file() {
                projects.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        projects.sort();
        Ok(projects)
    }
}
