// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A small JSONPath dialect, the subset kubectl templates and binding annotations use.
//!
//! Supported: `.field`, `['field']`, `[0]`, `[*]` and one equality filter
//! `[?(@.field=="value")]`. Expressions may be wrapped in `{...}` and may start
//! with `$`. A *fixed* path only contains field and index segments and
//! therefore denotes at most one location in a document.

mod parser;

use crate::error::{BindingError, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One step of a compiled path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
    Filter(Filter),
}

/// Equality predicate `@.a.b == "value"` applied to list elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: Vec<String>,
    pub value: String,
}

impl Filter {
    fn matches(&self, node: &Value) -> bool {
        let mut current = node;
        for field in &self.field {
            match current.get(field.as_str()) {
                Some(next) => current = next,
                None => return false,
            }
        }
        match current {
            Value::String(s) => *s == self.value,
            Value::Number(n) => n.to_string() == self.value,
            Value::Bool(b) => b.to_string() == self.value,
            _ => false,
        }
    }
}

/// A compiled JSONPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    expr: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let segments = parser::parse(expr)?;
        Ok(JsonPath {
            expr: expr.to_string(),
            segments,
        })
    }

    /// Build a path from already known segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let expr = segments.iter().map(Segment::to_string).collect();
        JsonPath { expr, segments }
    }

    /// Parse an expression that must denote exactly one field.
    pub fn parse_fixed(expr: &str) -> Result<Self> {
        let path = JsonPath::parse(expr)?;
        path.validate_fixed()?;
        Ok(path)
    }

    pub fn validate_fixed(&self) -> Result<()> {
        if self.is_fixed() {
            Ok(())
        } else {
            Err(BindingError::InvalidFixedPath(self.expr.clone()))
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Field(_) | Segment::Index(_)))
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the trailing field segment, used as default output name.
    pub fn last_field(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            Segment::Field(f) => Some(f.as_str()),
            _ => None,
        })
    }

    /// Append more segments, e.g. `[*]` to a path pointing at a list.
    pub fn join(&self, suffix: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.extend(parser::parse(suffix)?);
        Ok(JsonPath::from_segments(segments))
    }

    /// Evaluate against a document, returning every matching node.
    ///
    /// A missing field or out of range index anywhere on the way fails with
    /// [`BindingError::PathNotFound`]; a filter that matches nothing yields an
    /// empty result.
    pub fn evaluate<'a>(&self, doc: &'a Value) -> Result<Vec<&'a Value>> {
        let mut current = vec![doc];
        for segment in &self.segments {
            let mut next = Vec::with_capacity(current.len());
            for node in current {
                match segment {
                    Segment::Field(f) => {
                        next.push(node.get(f.as_str()).ok_or_else(|| self.not_found())?)
                    }
                    Segment::Index(i) => next.push(node.get(*i).ok_or_else(|| self.not_found())?),
                    Segment::Wildcard => match node {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(map) => next.extend(map.values()),
                        _ => return Err(self.not_found()),
                    },
                    Segment::Filter(filter) => match node {
                        Value::Array(items) => {
                            next.extend(items.iter().filter(|i| filter.matches(i)))
                        }
                        _ => return Err(self.not_found()),
                    },
                }
            }
            current = next;
        }
        Ok(current)
    }

    /// Evaluate and require exactly one result.
    pub fn evaluate_one<'a>(&self, doc: &'a Value) -> Result<&'a Value> {
        let mut values = self.evaluate(doc)?;
        match values.len() {
            1 => Ok(values.remove(0)),
            0 => Err(self.not_found()),
            _ => Err(BindingError::InvalidFixedPath(self.expr.clone())),
        }
    }

    /// Mutable access to every matching node. Missing branches are skipped.
    pub fn select_mut<'a>(&self, doc: &'a mut Value) -> Vec<&'a mut Value> {
        let mut out = Vec::new();
        select_mut(&self.segments, doc, &mut out);
        out
    }

    /// Mutable access to the single node of a fixed path, if present.
    pub fn get_mut<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
        let mut node = doc;
        for segment in &self.segments {
            node = match segment {
                Segment::Field(f) => node.get_mut(f.as_str())?,
                Segment::Index(i) => node.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Mutable access to the node of a fixed path, creating missing objects on
    /// the way and initialising a missing (or null) leaf with `default`.
    pub fn get_or_insert_with<'a>(
        &self,
        doc: &'a mut Value,
        default: impl FnOnce() -> Value,
    ) -> Result<&'a mut Value> {
        let mut node = doc;
        for segment in &self.segments {
            node = match segment {
                Segment::Field(f) => {
                    if node.is_null() {
                        *node = Value::Object(Map::new());
                    }
                    let Value::Object(map) = node else {
                        return Err(self.not_found());
                    };
                    map.entry(f.clone()).or_insert(Value::Null)
                }
                Segment::Index(i) => node.get_mut(*i).ok_or_else(|| self.not_found())?,
                _ => return Err(BindingError::InvalidFixedPath(self.expr.clone())),
            };
        }
        if node.is_null() {
            *node = default();
        }
        Ok(node)
    }

    /// Remove the leaf of a fixed path from its parent object.
    pub fn remove(&self, doc: &mut Value) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut node = doc;
        for segment in parents {
            node = match segment {
                Segment::Field(f) => node.get_mut(f.as_str())?,
                Segment::Index(i) => node.get_mut(*i)?,
                _ => return None,
            };
        }
        match last {
            Segment::Field(f) => node.as_object_mut()?.remove(f),
            _ => None,
        }
    }

    fn not_found(&self) -> BindingError {
        BindingError::PathNotFound(self.expr.clone())
    }
}

fn select_mut<'a>(segments: &[Segment], node: &'a mut Value, out: &mut Vec<&'a mut Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(node);
        return;
    };
    match head {
        Segment::Field(f) => {
            if let Some(child) = node.get_mut(f.as_str()) {
                select_mut(rest, child, out);
            }
        }
        Segment::Index(i) => {
            if let Some(child) = node.get_mut(*i) {
                select_mut(rest, child, out);
            }
        }
        Segment::Wildcard => match node {
            Value::Array(items) => {
                for item in items.iter_mut() {
                    select_mut(rest, item, out);
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    select_mut(rest, item, out);
                }
            }
            _ => {}
        },
        Segment::Filter(filter) => {
            if let Value::Array(items) = node {
                for item in items.iter_mut().filter(|i| filter.matches(i)) {
                    select_mut(rest, item, out);
                }
            }
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name)
                if name
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-') =>
            {
                write!(f, ".{}", name)
            }
            Segment::Field(name) => write!(f, "['{}']", name),
            Segment::Index(i) => write!(f, "[{}]", i),
            Segment::Wildcard => f.write_str("[*]"),
            Segment::Filter(filter) => {
                write!(f, "[?(@.{}==\"{}\")]", filter.field.join("."), filter.value)
            }
        }
    }
}

impl FromStr for JsonPath {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self> {
        JsonPath::parse(s)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "status": {
                "dbCredential": {"username": "AzureDiamond", "port": 5432},
                "urls": [
                    {"type": "primary", "url": "db-0"},
                    {"type": "replica", "url": "db-1"}
                ]
            },
            "metadata": {"annotations": {"app.kubernetes.io/name": "db"}}
        })
    }

    #[test]
    fn test_dotted_field() {
        let path = JsonPath::parse("{.status.dbCredential.username}").unwrap();
        assert_eq!(path.evaluate(&doc()).unwrap(), vec![&json!("AzureDiamond")]);
    }

    #[test]
    fn test_bracket_field_with_dots() {
        let path = JsonPath::parse(".metadata.annotations['app.kubernetes.io/name']").unwrap();
        assert_eq!(path.evaluate(&doc()).unwrap(), vec![&json!("db")]);
    }

    #[test]
    fn test_index_and_wildcard() {
        let d = doc();
        let path = JsonPath::parse(".status.urls[1].url").unwrap();
        assert_eq!(path.evaluate(&d).unwrap(), vec![&json!("db-1")]);

        let path = JsonPath::parse("$.status.urls[*].url").unwrap();
        assert_eq!(
            path.evaluate(&d).unwrap(),
            vec![&json!("db-0"), &json!("db-1")]
        );
    }

    #[test]
    fn test_filter() {
        let d = doc();
        let path = JsonPath::parse(r#".status.urls[?(@.type=="replica")].url"#).unwrap();
        assert_eq!(path.evaluate(&d).unwrap(), vec![&json!("db-1")]);

        let path = JsonPath::parse(".status.urls[?(@.type=='none')].url").unwrap();
        assert!(path.evaluate(&d).unwrap().is_empty());
    }

    #[test]
    fn test_missing_segment_is_not_found() {
        let path = JsonPath::parse(".status.missing.username").unwrap();
        let err = path.evaluate(&doc()).unwrap_err();
        assert!(matches!(err, BindingError::PathNotFound(_)));
    }

    #[test]
    fn test_fixed_validation() {
        assert!(JsonPath::parse_fixed(".spec.template.spec.volumes").is_ok());
        assert!(JsonPath::parse_fixed("env").is_ok());
        assert!(matches!(
            JsonPath::parse_fixed(".name[*]").unwrap_err(),
            BindingError::InvalidFixedPath(_)
        ));
        assert!(matches!(
            JsonPath::parse_fixed(r#".env[?(@.name=="a")]"#).unwrap_err(),
            BindingError::InvalidFixedPath(_)
        ));
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in ["", "{}", ".a[", ".a[?(@.b>1)]", ".a..b", ".a['b]"] {
            assert!(
                matches!(JsonPath::parse(expr), Err(BindingError::InvalidPath { .. })),
                "{expr} should not parse"
            );
        }
    }

    #[test]
    fn test_last_field() {
        let path = JsonPath::parse("{.status.dbCredential}").unwrap();
        assert_eq!(path.last_field(), Some("dbCredential"));
        let path = JsonPath::parse(".status.urls[*]").unwrap();
        assert_eq!(path.last_field(), Some("urls"));
    }

    #[test]
    fn test_select_mut_with_filter() {
        let mut d = doc();
        let path = JsonPath::parse(r#".status.urls[?(@.type=="primary")]"#).unwrap();
        for node in path.select_mut(&mut d) {
            node["url"] = json!("db-2");
        }
        assert_eq!(d["status"]["urls"][0]["url"], json!("db-2"));
        assert_eq!(d["status"]["urls"][1]["url"], json!("db-1"));
    }

    #[test]
    fn test_get_or_insert_creates_parents() {
        let mut d = json!({"spec": {}});
        let path = JsonPath::parse_fixed(".spec.template.spec.volumes").unwrap();
        let volumes = path.get_or_insert_with(&mut d, || json!([])).unwrap();
        volumes.as_array_mut().unwrap().push(json!({"name": "v"}));
        assert_eq!(d, json!({"spec": {"template": {"spec": {"volumes": [{"name": "v"}]}}}}));
    }

    #[test]
    fn test_remove_leaf() {
        let mut d = json!({"a": {"b": [1], "c": 2}});
        let path = JsonPath::parse_fixed(".a.b").unwrap();
        assert_eq!(path.remove(&mut d), Some(json!([1])));
        assert_eq!(d, json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_from_segments_renders_expression() {
        let path = JsonPath::from_segments(vec![
            Segment::Field("spec".to_string()),
            Segment::Field("app.kubernetes.io/name".to_string()),
            Segment::Wildcard,
        ]);
        assert_eq!(path.expr(), ".spec['app.kubernetes.io/name'][*]");
        assert_eq!(JsonPath::parse(path.expr()).unwrap().segments(), path.segments());
    }

    #[test]
    fn test_join() {
        let path = JsonPath::parse(".spec.containers").unwrap().join("[*]").unwrap();
        assert!(!path.is_fixed());
        let d = json!({"spec": {"containers": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(path.evaluate(&d).unwrap().len(), 2);

        let wrapped = JsonPath::parse("{.spec.containers}").unwrap().join("[*]").unwrap();
        assert_eq!(wrapped.expr(), ".spec.containers[*]");
        assert_eq!(wrapped, path);
    }
}
