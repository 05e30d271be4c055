//! Prompt template store for postforge.
//!
//! Templates are loaded once from a TOML collection, compiled, and then shared
//! read-only across pipeline runs. Each entry supplies `description`,
//! `system_text` and `human_text`:
//!
//! ```toml
//! [refinement]
//! description = "Revise one post"
//! system_text = "You are a LinkedIn content optimization expert."
//! human_text = "Original Post:\n{post}\n\nUser Feedback:\n{feedback}"
//! ```

mod template;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use postforge_shared::{PostforgeError, RenderedPrompt, Result};

pub use template::{PromptTemplate, Variables};

/// The template collection compiled into the binary.
const BUILTIN_TEMPLATES: &str = include_str!("../templates/default.toml");

/// One entry of the TOML collection, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    system_text: Option<String>,
    #[serde(default)]
    human_text: Option<String>,
}

// ---------------------------------------------------------------------------
// TemplateStore
// ---------------------------------------------------------------------------

/// Immutable collection of compiled prompt templates, keyed by name.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    templates: BTreeMap<String, PromptTemplate>,
}

impl TemplateStore {
    /// Parse and compile a TOML template collection.
    pub fn load(source: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawTemplate> = toml::from_str(source)
            .map_err(|e| PostforgeError::template_source(e.to_string()))?;

        if raw.is_empty() {
            return Err(PostforgeError::template_source(
                "template collection is empty",
            ));
        }

        let mut templates = BTreeMap::new();
        for (name, entry) in raw {
            let system_text = required_text(&name, "system_text", entry.system_text)?;
            let human_text = required_text(&name, "human_text", entry.human_text)?;
            let template = PromptTemplate::new(
                name.clone(),
                entry.description.unwrap_or_default(),
                &system_text,
                &human_text,
            );
            debug!(
                template = %name,
                placeholders = ?template.placeholders(),
                "compiled template"
            );
            templates.insert(name, template);
        }

        Ok(Self { templates })
    }

    /// Load a TOML template collection from a file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| PostforgeError::io(path, e))?;
        let store = Self::load(&source)?;
        info!(?path, count = store.len(), "loaded prompt templates");
        Ok(store)
    }

    /// The collection shipped with postforge.
    pub fn builtin() -> Result<Self> {
        Self::load(BUILTIN_TEMPLATES)
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Render a template by name.
    pub fn render(&self, name: &str, vars: &Variables) -> Result<RenderedPrompt> {
        self.get(name)
            .ok_or_else(|| PostforgeError::TemplateNotFound {
                name: name.to_string(),
            })?
            .render(vars)
    }

    /// Fail with `TemplateNotFound` for the first name the store lacks.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.templates.contains_key(**name)) {
            Some(missing) => Err(PostforgeError::TemplateNotFound {
                name: (*missing).to_string(),
            }),
            None => Ok(()),
        }
    }

    /// All templates, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn required_text(template: &str, field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(PostforgeError::template_source(format!(
            "template `{template}` has no {field}"
        ))),
    }
}
