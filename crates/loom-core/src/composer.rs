//! Prompt assembly: ordered fragments, `${name}` substitution, separators.

use crate::config::ComposerConfig;
use crate::error::{LoomError, Result};
use crate::handoff::HandoffRecord;
use crate::library::{Library, SectionSpec, TaskDefinition};
use crate::paths;
use crate::types::{FragmentKind, Phase};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// PromptContext
// ---------------------------------------------------------------------------

/// Values available to `${name}` placeholders.
///
/// The well-known values are typed fields; `vars` carries operator-supplied
/// extras. `agent` and `task` are always in scope during composition.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub project_id: Option<String>,
    pub phase: Option<Phase>,
    pub workspace: Option<String>,
    pub handoff: Option<HandoffRecord>,
    pub vars: BTreeMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_handoff(mut self, handoff: Option<HandoffRecord>) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "project_id" => self.project_id.clone(),
            "phase" => self.phase.map(|p| p.to_string()),
            "workspace" => self.workspace.clone(),
            _ => self.vars.get(name).cloned(),
        }
    }

    /// Every supplied value, typed fields first.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(p) = &self.project_id {
            out.push(("project_id".to_string(), p.clone()));
        }
        if let Some(p) = self.phase {
            out.push(("phase".to_string(), p.to_string()));
        }
        if let Some(w) = &self.workspace {
            out.push(("workspace".to_string(), w.clone()));
        }
        for (k, v) in &self.vars {
            out.push((k.clone(), v.clone()));
        }
        out
    }
}

struct Scope<'a> {
    ctx: &'a PromptContext,
    agent: &'a str,
    task: &'a str,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "agent" => Some(self.agent.to_string()),
            "task" | "task_id" => Some(self.task.to_string()),
            _ => self.ctx.lookup(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Placeholder substitution
// ---------------------------------------------------------------------------

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\$(\$)?\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").unwrap())
}

/// Replace `${name}` with `lookup(name)`; `$${name}` yields a literal
/// `${name}`. Returns the text and the names left unresolved (non-strict).
pub fn substitute(
    text: &str,
    origin: &str,
    strict: bool,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(String, Vec<String>)> {
    let mut unresolved = Vec::new();
    let mut failure = None;
    let out = placeholder_re().replace_all(text, |caps: &Captures| {
        let name = &caps[2];
        if caps.get(1).is_some() {
            return format!("${{{name}}}");
        }
        match lookup(name) {
            Some(value) => value,
            None => {
                if strict && failure.is_none() {
                    failure = Some(name.to_string());
                }
                unresolved.push(name.to_string());
                caps[0].to_string()
            }
        }
    });
    if let Some(name) = failure {
        return Err(LoomError::UnresolvedPlaceholder {
            name,
            origin: origin.to_string(),
        });
    }
    Ok((out.into_owned(), unresolved))
}

// ---------------------------------------------------------------------------
// ComposedPrompt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub kind: FragmentKind,
    pub path: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedPrompt {
    pub agent: String,
    pub task: String,
    pub text: String,
    pub sections: Vec<SectionSummary>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

pub struct Composer<'a> {
    library: &'a Library,
    config: &'a ComposerConfig,
    cache: HashMap<PathBuf, String>,
}

impl<'a> Composer<'a> {
    pub fn new(library: &'a Library, config: &'a ComposerConfig) -> Self {
        Self {
            library,
            config,
            cache: HashMap::new(),
        }
    }

    pub fn compose(&mut self, agent: &str, task: &str, ctx: &PromptContext) -> Result<ComposedPrompt> {
        let agent_dir = self.library.agent_dir(agent)?;
        let task_def = self.library.task(agent, task)?;
        let spec = self.library.composition(agent)?;
        let spec_path = agent_dir.join(paths::COMPOSITION_FILE);
        let scope = Scope { ctx, agent, task };

        for name in &task_def.meta.requires {
            if scope.lookup(name).is_none() {
                return Err(LoomError::MissingContextVariable {
                    task: task.to_string(),
                    name: name.clone(),
                });
            }
        }

        let mut pieces: Vec<String> = Vec::new();
        let mut sections = Vec::new();
        let mut warnings = Vec::new();

        for (index, section) in spec.sections.iter().enumerate() {
            let path = self.resolve(section, index, &agent_dir, &spec_path, &task_def)?;
            if !path.is_file() {
                if section.optional {
                    tracing::debug!(path = %path.display(), "skipping optional section");
                    continue;
                }
                return Err(LoomError::MissingFile {
                    kind: section.kind.to_string(),
                    path,
                    hint: missing_hint(section.kind),
                });
            }

            let raw = self.read_cached(&path)?;
            let origin = paths::relative_display(self.library.root(), &path);
            let strict = self.config.strict_placeholders;
            let mut unresolved = Vec::new();

            // Knowledge is reference data and is embedded verbatim.
            let body = match section.kind {
                FragmentKind::Knowledge => {
                    crate::io::parse_yaml::<serde_yaml::Value>(&path, &raw)?;
                    let name = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    format!("## Knowledge: {name}\n\n```yaml\n{}\n```", raw.trim_end())
                }
                _ => {
                    let (body, missed) =
                        substitute(raw.trim_end(), &origin, strict, |n| scope.lookup(n))?;
                    unresolved.extend(missed);
                    body
                }
            };
            let text = match &section.title {
                Some(title) => {
                    let (title, missed) = substitute(title, &origin, strict, |n| scope.lookup(n))?;
                    unresolved.extend(missed);
                    format!("## {title}\n\n{body}")
                }
                None => body,
            };
            for name in unresolved {
                warnings.push(format!("unresolved placeholder '${{{name}}}' in {origin}"));
            }

            sections.push(SectionSummary {
                kind: section.kind,
                path: origin,
                bytes: text.len(),
            });
            pieces.push(text);
        }

        if !pieces.is_empty() {
            if let Some(handoff) = &ctx.handoff {
                pieces.push(handoff.render_markdown().trim_end().to_string());
            }
            if spec.include_context {
                pieces.push(context_block(&scope));
            }
        }

        let separator = spec
            .separator
            .as_deref()
            .unwrap_or(self.config.separator.as_str());
        let text = pieces.join(separator);

        if text.len() > self.config.max_prompt_bytes {
            tracing::warn!(
                agent,
                task,
                bytes = text.len(),
                limit = self.config.max_prompt_bytes,
                "composed prompt exceeds size limit"
            );
            warnings.push(format!(
                "prompt is {} bytes, above the {} byte limit",
                text.len(),
                self.config.max_prompt_bytes
            ));
        }

        Ok(ComposedPrompt {
            agent: agent.to_string(),
            task: task.to_string(),
            text,
            sections,
            warnings,
        })
    }

    fn resolve(
        &self,
        section: &SectionSpec,
        index: usize,
        agent_dir: &Path,
        spec_path: &Path,
        task_def: &TaskDefinition,
    ) -> Result<PathBuf> {
        match (section.kind, section.path.as_deref()) {
            (FragmentKind::Task, None) => Ok(task_def.text_path.clone()),
            (FragmentKind::Knowledge, Some(p)) => Ok(self.library.knowledge_path(p)),
            (_, Some(p)) => Ok(agent_dir.join(p)),
            (kind, None) => Err(LoomError::MalformedYaml {
                path: spec_path.to_path_buf(),
                line: None,
                message: format!("section {} ({kind}) needs a `path`", index + 1),
            }),
        }
    }

    fn read_cached(&mut self, path: &Path) -> Result<String> {
        if let Some(text) = self.cache.get(path) {
            return Ok(text.clone());
        }
        tracing::debug!(path = %path.display(), "loading fragment");
        let text = std::fs::read_to_string(path)?;
        self.cache.insert(path.to_path_buf(), text.clone());
        Ok(text)
    }
}

fn missing_hint(kind: FragmentKind) -> String {
    match kind {
        FragmentKind::Knowledge => {
            "add the knowledge base or fix the path in _composition.yaml".to_string()
        }
        FragmentKind::Task => "create the task text next to its metadata".to_string(),
        _ => "create the fragment or mark the section `optional: true`".to_string(),
    }
}

fn context_block(scope: &Scope) -> String {
    let mut out = String::from("## Context\n\n");
    out.push_str(&format!("- agent: {}\n", scope.agent));
    out.push_str(&format!("- task: {}\n", scope.task));
    for (key, value) in scope.ctx.entries() {
        out.push_str(&format!("- {key}: {value}\n"));
    }
    out.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
