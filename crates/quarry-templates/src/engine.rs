//! Jinja-style SQL template engine
//!
//! Renders virtual dataset SQL and SQL Lab queries with MiniJinja. Undefined
//! variables are strict failures; the error message names the first missing
//! variable so it can be surfaced on the right form field.

use minijinja::{Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)").expect("static regex must compile")
});

#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template is malformed or references an undefined variable;
    /// correctable by the caller.
    #[error("{0}")]
    Syntax(String),

    /// The template is well-formed but the engine failed to render it.
    #[error("{0}")]
    Processing(String),
}

/// Top-level variable names a template references.
pub fn referenced_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in VARIABLE_RE.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Referenced variables with no binding in `params`, in template order.
pub fn undefined_variables(template: &str, params: &HashMap<String, Value>) -> Vec<String> {
    referenced_variables(template)
        .into_iter()
        .filter(|name| !params.contains_key(name))
        .collect()
}

/// SQL template renderer with strict undefined handling.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render a template against the given parameters.
    pub fn render(
        &self,
        template: &str,
        params: &HashMap<String, Value>,
    ) -> Result<String, TemplateError> {
        let tmpl = self
            .env
            .template_from_str(template)
            .map_err(|err| TemplateError::Syntax(err.to_string()))?;
        tmpl.render(params).map_err(|err| {
            if err.kind() == minijinja::ErrorKind::UndefinedError {
                // Undefined variables are the caller's to fix, same as a
                // malformed tag. The engine's own message does not carry the
                // variable name, so recover it from the template text.
                if let Some(name) = undefined_variables(template, params).first() {
                    return TemplateError::Syntax(format!("'{name}' is undefined"));
                }
                return TemplateError::Syntax(err.to_string());
            }
            TemplateError::Processing(err.to_string())
        })
    }

    /// Render when template processing is enabled, pass through otherwise.
    pub fn render_if_enabled(
        &self,
        template: &str,
        params: &HashMap<String, Value>,
        enabled: bool,
    ) -> Result<String, TemplateError> {
        if !enabled {
            return Ok(template.to_string());
        }
        self.render(template, params)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn renders_bound_variables() {
        let renderer = TemplateRenderer::new();
        let sql = renderer
            .render(
                "SELECT * FROM events WHERE ds = '{{ ds }}' LIMIT {{ limit }}",
                &params(&[("ds", json!("2024-01-05")), ("limit", json!(10))]),
            )
            .unwrap();
        assert_eq!(sql, "SELECT * FROM events WHERE ds = '2024-01-05' LIMIT 10");
    }

    #[test]
    fn undefined_variable_is_named_in_the_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer
            .render("SELECT {{ missing }}", &HashMap::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "'missing' is undefined");
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn malformed_template_is_a_syntax_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer
            .render("SELECT {% if %}", &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn disabled_processing_passes_through() {
        let renderer = TemplateRenderer::new();
        let sql = renderer
            .render_if_enabled("SELECT {{ missing }}", &HashMap::new(), false)
            .unwrap();
        assert_eq!(sql, "SELECT {{ missing }}");
    }

    #[test]
    fn referenced_variables_are_ordered_and_deduplicated() {
        assert_eq!(
            referenced_variables("{{ a }} {{ b }} {{ a }} {{ b | upper }}"),
            vec!["a", "b"]
        );
    }
}
