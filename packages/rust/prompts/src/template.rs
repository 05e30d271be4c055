//! Placeholder syntax: compile once, render many times.
//!
//! - `{name}` is a placeholder when `name` is an identifier (`[A-Za-z_][A-Za-z0-9_]*`)
//! - `{{` and `}}` render as literal `{` and `}`
//! - any other brace is literal text

use std::collections::{BTreeMap, BTreeSet};

use postforge_shared::{PostforgeError, RenderedPrompt, Result};

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Values supplied for placeholder substitution.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Compiled text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A text split into literal runs and placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledText {
    segments: Vec<Segment>,
}

impl CompiledText {
    pub(crate) fn compile(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
            literal.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") {
                literal.push('{');
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with("}}") {
                literal.push('}');
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('{') {
                if let Some(end) = tail[1..].find('}') {
                    let name = &tail[1..1 + end];
                    if is_identifier(name) {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Placeholder(name.to_string()));
                        rest = &tail[end + 2..];
                        continue;
                    }
                }
            }

            // Lone brace: keep it as text.
            literal.push_str(&tail[..1]);
            rest = &tail[1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub(crate) fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub(crate) fn render(&self, template: &str, vars: &Variables) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = vars.get(name).ok_or_else(|| {
                        PostforgeError::TemplateVariableMissing {
                            template: template.to_string(),
                            placeholder: name.clone(),
                        }
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// PromptTemplate
// ---------------------------------------------------------------------------

/// A named system/human prompt pair with a fixed placeholder set.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    description: String,
    system: CompiledText,
    human: CompiledText,
}

impl PromptTemplate {
    /// Compile a template from its raw texts.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_text: &str,
        human_text: &str,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system: CompiledText::compile(system_text),
            human: CompiledText::compile(human_text),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Every placeholder declared in either text.
    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.system
            .placeholders()
            .chain(self.human.placeholders())
            .collect()
    }

    /// Substitute every placeholder. Fails on the first one without a value.
    pub fn render(&self, vars: &Variables) -> Result<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.system.render(&self.name, vars)?,
            human: self.human.render(&self.name, vars)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_placeholders_and_literals() {
        let text = CompiledText::compile("Hello {name}, welcome to {place}!");
        let names: Vec<_> = text.placeholders().collect();
        assert_eq!(names, vec!["name", "place"]);
    }

    #[test]
    fn double_braces_are_literal() {
        let text = CompiledText::compile(r#"Return {{"topics": [...]}} for {field}"#);
        let vars = Variables::new().with("field", "Finance");
        let out = text.render("t", &vars).unwrap();
        assert_eq!(out, r#"Return {"topics": [...]} for Finance"#);
    }

    #[test]
    fn lone_and_non_identifier_braces_are_literal() {
        let text = CompiledText::compile("a { b } {not valid} {1x} end {");
        assert_eq!(text.placeholders().count(), 0);
        let out = text.render("t", &Variables::new()).unwrap();
        assert_eq!(out, "a { b } {not valid} {1x} end {");
    }

    #[test]
    fn missing_value_names_template_and_placeholder() {
        let template = PromptTemplate::new("refinement", "", "sys", "{post}\n{feedback}");
        let err = template
            .render(&Variables::new().with("post", "text"))
            .unwrap_err();
        match err {
            PostforgeError::TemplateVariableMissing {
                template,
                placeholder,
            } => {
                assert_eq!(template, "refinement");
                assert_eq!(placeholder, "feedback");
            }
            other => panic!("expected TemplateVariableMissing, got {other:?}"),
        }
    }

    #[test]
    fn placeholder_set_spans_both_texts() {
        let template = PromptTemplate::new("t", "", "about {field}", "{field} and {context}");
        let set = template.placeholders();
        assert_eq!(set.len(), 2);
        assert!(set.contains("field"));
        assert!(set.contains("context"));
    }

    #[test]
    fn extra_variables_are_ignored() {
        let template = PromptTemplate::new("t", "", "S", "H {a}");
        let rendered = template
            .render(&Variables::new().with("a", "1").with("unused", "2"))
            .unwrap();
        assert_eq!(rendered.human, "H 1");
    }

    #[test]
    fn values_are_not_reinterpreted() {
        let template = PromptTemplate::new("t", "", "", "{a}");
        let rendered = template
            .render(&Variables::new().with("a", "{b} {{c}}"))
            .unwrap();
        assert_eq!(rendered.human, "{b} {{c}}");
    }
}
