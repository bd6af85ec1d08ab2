// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{BindingError, Result};
use serde_json::{Map, Value as JsonValue};

/// Output of applying a binding definition: a map of output names to
/// (possibly nested) values.
#[derive(Debug, Clone, PartialEq)]
pub struct Value(JsonValue);

impl Value {
    pub fn new(value: JsonValue) -> Self {
        Value(value)
    }

    /// A single `name -> value` entry.
    pub fn named(name: &str, value: JsonValue) -> Self {
        let mut map = Map::new();
        map.insert(name.to_string(), value);
        Value(JsonValue::Object(map))
    }

    pub fn empty() -> Self {
        Value(JsonValue::Object(Map::new()))
    }

    pub fn get(&self) -> &JsonValue {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Null => true,
            JsonValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Flatten into scalar `(name, value)` pairs. Nested keys are joined with
    /// `_` and list elements get their index as suffix.
    ///
    /// The top level must be a map, and no leaf may be null: partial data is
    /// never handed out.
    pub fn flatten(&self, origin: &str) -> Result<Vec<(String, String)>> {
        let JsonValue::Object(map) = &self.0 else {
            return Err(BindingError::DataNotMap(origin.to_string()));
        };
        let mut out = Vec::new();
        for (key, value) in map {
            flatten_into(key, value, &mut out)?;
        }
        Ok(out)
    }
}

fn flatten_into(prefix: &str, value: &JsonValue, out: &mut Vec<(String, String)>) -> Result<()> {
    match value {
        JsonValue::Null => return Err(BindingError::ValueNotFound(prefix.to_string())),
        JsonValue::String(s) => out.push((prefix.to_string(), s.clone())),
        JsonValue::Bool(_) | JsonValue::Number(_) => {
            out.push((prefix.to_string(), value.to_string()))
        }
        JsonValue::Object(map) => {
            for (key, nested) in map {
                flatten_into(&format!("{}_{}", prefix, key), nested, out)?;
            }
        }
        JsonValue::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                flatten_into(&format!("{}_{}", prefix, i), nested, out)?;
            }
        }
    }
    Ok(())
}

/// Render a scalar node as the string stored in a binding.
pub fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(_) | JsonValue::Number(_) => Some(value.to_string()),
        _ => None,
    }
}
