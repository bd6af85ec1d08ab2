// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rendering of naming strategies and custom mappings.
//!
//! Users write Go template style expressions (`{{ .service.kind | upper }}`).
//! The leading dots of field references are dropped so the expression can be
//! rendered by minijinja, which already has `upper`, `lower` and `title`.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render `template` against `ctx`. Unknown fields are an error.
    pub fn render<S: Serialize>(&self, template: &str, ctx: S) -> Result<String, minijinja::Error> {
        let translated = strip_field_dots(template);
        self.env.render_str(&translated, ctx)
    }
}

/// Rewrite `{{ .a.b }}` into `{{ a.b }}` inside expressions. Quoted strings
/// and text outside `{{ }}` are kept as is.
fn strip_field_dots(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        result.push_str(&remaining[..start + 2]);
        remaining = &remaining[start + 2..];

        let end = remaining.find("}}").unwrap_or(remaining.len());
        result.push_str(&strip_expression_dots(&remaining[..end]));
        remaining = &remaining[end..];
    }

    result.push_str(remaining);
    result
}

fn strip_expression_dots(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => {
                let starts_field = c == '.'
                    && !prev.is_some_and(|p| {
                        p.is_alphanumeric() || p == '_' || p == ']' || p == ')'
                    })
                    && chars.peek().is_some_and(|n| n.is_alphabetic() || *n == '_');
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                if !starts_field {
                    out.push(c);
                }
            }
        }
        prev = Some(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_field_dots() {
        assert_eq!(strip_field_dots("{{ .name }}"), "{{ name }}");
        assert_eq!(
            strip_field_dots("{{ .service.kind | upper }}_{{.name|upper}}"),
            "{{ service.kind | upper }}_{{name|upper}}"
        );
        assert_eq!(strip_field_dots("plain.text"), "plain.text");
        assert_eq!(strip_field_dots("{{ \".x\" ~ .name }}"), "{{ \".x\" ~ name }}");
    }

    #[test]
    fn test_render_presets() {
        let engine = TemplateEngine::new();
        let ctx = json!({"name": "host", "service": {"kind": "Database", "name": "db"}});

        assert_eq!(engine.render("{{ .name }}", &ctx).unwrap(), "host");
        assert_eq!(
            engine
                .render("{{ .service.kind | upper }}_{{ .name | upper }}", &ctx)
                .unwrap(),
            "DATABASE_HOST"
        );
        assert_eq!(
            engine.render("{{ .service.name | title }}-{{ .name }}", &ctx).unwrap(),
            "Db-host"
        );
    }

    #[test]
    fn test_render_unknown_field_fails() {
        let engine = TemplateEngine::new();
        let ctx = json!({"name": "host"});
        assert!(engine.render("{{ .service.kind }}", &ctx).is_err());
        assert!(engine.render("{{ .name ", &ctx).is_err());
    }
}
