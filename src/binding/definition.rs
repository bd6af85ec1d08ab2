// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Binding definitions compiled from `service.binding` annotations.
//!
//! An annotation such as
//!
//! ```text
//! service.binding/username: path={.status.dbCredential.username}
//! service.binding: path={.status.secret},objectType=Secret,sourceKey=password
//! ```
//!
//! compiles into a [`Definition`] that, applied to the annotated resource,
//! yields the named values to bind.

use super::value::{scalar_to_string, Value};
use crate::constants::annotations;
use crate::error::{BindingError, Result};
use crate::jsonpath::JsonPath;
use crate::kubernetes::{resources, ClusterAccess};
use base64::Engine;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Secret,
    ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionKind {
    /// Single path to a scalar
    String,
    /// Path to the name of a Secret/ConfigMap, optionally narrowed to one key
    MapFromDataField {
        object_type: ObjectType,
        source_key: Option<String>,
    },
    /// Path to a map, bound under the output name
    StringOfMap,
    /// Path to a list of objects, collapsed to `source_key -> source_value`
    SliceOfMapsFromPath {
        source_key: String,
        source_value: String,
    },
    /// Path to a list, projected to its elements (or one field of each)
    SliceOfStringsFromPath { source_value: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    path: JsonPath,
    /// Name given in the annotation key, if any
    output_name: Option<String>,
    optional: bool,
    kind: DefinitionKind,
}

/// Options parsed from an annotation value.
#[derive(Default)]
struct Options {
    path: Option<String>,
    object_type: Option<String>,
    element_type: Option<String>,
    source_key: Option<String>,
    source_value: Option<String>,
    optional: bool,
}

impl Definition {
    /// Compile one annotation. Fails for keys that are not binding keys, for
    /// malformed values and for option combinations that have no meaning.
    pub fn build(key: &str, value: &str) -> Result<Self> {
        let output_name = if key == annotations::BINDING {
            None
        } else if let Some(name) = key.strip_prefix(annotations::BINDING_PREFIX) {
            (!name.is_empty()).then(|| name.to_string())
        } else {
            return Err(BindingError::InvalidAnnotation(format!(
                "{} is not a binding annotation",
                key
            )));
        };

        let options = parse_options(key, value)?;
        let path_expr = options.path.as_deref().ok_or_else(|| {
            BindingError::InvalidAnnotation(format!("{}: path is required", key))
        })?;
        let path = JsonPath::parse(path_expr)
            .map_err(|e| BindingError::InvalidAnnotation(format!("{}: {}", key, e)))?;

        if output_name.is_none() && path.last_field().is_none() {
            return Err(BindingError::InvalidAnnotation(format!(
                "{}: cannot derive a name from path {}",
                key, path_expr
            )));
        }

        let object_type = match options.object_type.as_deref() {
            None => None,
            Some("Secret") => Some(ObjectType::Secret),
            Some("ConfigMap") => Some(ObjectType::ConfigMap),
            Some(other) => {
                return Err(BindingError::InvalidAnnotation(format!(
                    "{}: unknown objectType {}",
                    key, other
                )))
            }
        };

        let kind = match (options.element_type.as_deref(), object_type) {
            (None, None) => DefinitionKind::String,
            (None | Some("map"), Some(object_type)) => DefinitionKind::MapFromDataField {
                object_type,
                source_key: options.source_key.or(options.source_value),
            },
            (Some("map"), None) => DefinitionKind::StringOfMap,
            (Some("sliceOfMaps"), None) => match (options.source_key, options.source_value) {
                (Some(source_key), Some(source_value)) => DefinitionKind::SliceOfMapsFromPath {
                    source_key,
                    source_value,
                },
                _ => {
                    return Err(BindingError::InvalidAnnotation(format!(
                        "{}: sliceOfMaps requires sourceKey and sourceValue",
                        key
                    )))
                }
            },
            (Some("sliceOfStrings"), None) => DefinitionKind::SliceOfStringsFromPath {
                source_value: options.source_value,
            },
            (Some(element_type), object_type) => {
                return Err(BindingError::InvalidAnnotation(format!(
                    "{}: unsupported combination of elementType {} and objectType {:?}",
                    key, element_type, object_type
                )))
            }
        };

        Ok(Definition {
            path,
            output_name,
            optional: options.optional,
            kind,
        })
    }

    pub fn kind(&self) -> &DefinitionKind {
        &self.kind
    }

    pub fn path(&self) -> &JsonPath {
        &self.path
    }

    /// Name the values are bound under: the annotation suffix, else the last
    /// path segment.
    pub fn output_name(&self) -> &str {
        self.output_name
            .as_deref()
            .or_else(|| self.path.last_field())
            .unwrap_or_default()
    }

    /// True when an optional definition produced nothing to bind.
    pub fn non_existing_optional(&self, value: &Value) -> bool {
        self.optional && value.is_empty()
    }

    /// Resolve the definition against `resource`, reading referenced
    /// Secrets/ConfigMaps from the resource's namespace.
    pub async fn apply(&self, resource: &JsonValue, cluster: &dyn ClusterAccess) -> Result<Value> {
        let found = match self.path.evaluate(resource) {
            Ok(found) => found,
            Err(BindingError::PathNotFound(_)) if self.optional => return Ok(Value::empty()),
            Err(e) => return Err(e),
        };
        if found.is_empty() {
            if self.optional {
                return Ok(Value::empty());
            }
            return Err(BindingError::PathNotFound(self.path.to_string()));
        }

        let name = self.output_name();
        match &self.kind {
            DefinitionKind::String => {
                let value = if found.len() == 1 {
                    found[0].clone()
                } else {
                    JsonValue::Array(found.into_iter().cloned().collect())
                };
                Ok(Value::named(name, value))
            }
            DefinitionKind::StringOfMap => {
                let mut merged = Map::new();
                for node in found {
                    let JsonValue::Object(map) = node else {
                        return Err(BindingError::DataNotMap(self.path.to_string()));
                    };
                    merged.extend(map.clone());
                }
                Ok(Value::named(name, JsonValue::Object(merged)))
            }
            DefinitionKind::SliceOfMapsFromPath {
                source_key,
                source_value,
            } => {
                let mut collapsed = Map::new();
                for element in elements(found) {
                    let key = element
                        .get(source_key.as_str())
                        .and_then(scalar_to_string)
                        .ok_or_else(|| {
                            BindingError::ValueNotFound(format!("{}.{}", name, source_key))
                        })?;
                    let value = element
                        .get(source_value.as_str())
                        .cloned()
                        .unwrap_or(JsonValue::Null);
                    collapsed.insert(key, value);
                }
                Ok(Value::named(name, JsonValue::Object(collapsed)))
            }
            DefinitionKind::SliceOfStringsFromPath { source_value } => {
                let values = elements(found)
                    .map(|element| match source_value {
                        Some(field) => element
                            .get(field.as_str())
                            .cloned()
                            .unwrap_or(JsonValue::Null),
                        None => element.clone(),
                    })
                    .collect();
                Ok(Value::named(name, JsonValue::Array(values)))
            }
            DefinitionKind::MapFromDataField {
                object_type,
                source_key,
            } => {
                let object_name = scalar_to_string(found[0]).ok_or_else(|| {
                    BindingError::ValueNotFound(format!("{} (object name)", self.path))
                })?;
                let namespace = resource
                    .pointer("/metadata/namespace")
                    .and_then(JsonValue::as_str);
                let data = read_data(cluster, *object_type, namespace, &object_name).await?;

                match source_key {
                    Some(key) => {
                        let value = data.get(key).cloned().ok_or_else(|| {
                            BindingError::ValueNotFound(format!("{}/{}", object_name, key))
                        })?;
                        let name = self.output_name.as_deref().unwrap_or(key);
                        Ok(Value::named(name, JsonValue::String(value)))
                    }
                    None => {
                        let map: Map<String, JsonValue> = data
                            .into_iter()
                            .map(|(k, v)| (k, JsonValue::String(v)))
                            .collect();
                        match &self.output_name {
                            Some(name) => Ok(Value::named(name, JsonValue::Object(map))),
                            None => Ok(Value::new(JsonValue::Object(map))),
                        }
                    }
                }
            }
        }
    }
}

/// Elements of a list result: a single list match is expanded, several
/// matches (from a wildcard) are taken as the elements themselves.
fn elements<'a>(found: Vec<&'a JsonValue>) -> Box<dyn Iterator<Item = &'a JsonValue> + 'a> {
    if let [single] = found.as_slice() {
        if let JsonValue::Array(items) = *single {
            return Box::new(items.iter());
        }
    }
    Box::new(found.into_iter())
}

/// Read the data of a Secret or ConfigMap. Secret values are base64 decoded.
pub async fn read_data(
    cluster: &dyn ClusterAccess,
    object_type: ObjectType,
    namespace: Option<&str>,
    name: &str,
) -> Result<BTreeMap<String, String>> {
    let resource = match object_type {
        ObjectType::Secret => resources::secret(),
        ObjectType::ConfigMap => resources::config_map(),
    };
    debug!("Reading {} {:?}/{}", resource.kind, namespace, name);
    let object = cluster.get(&resource, namespace, name).await?;
    object_data(&object.data, object_type)
}

/// Extract string data from a Secret/ConfigMap document. A Secret value
/// that does not decode fails the whole read.
pub fn object_data(
    document: &JsonValue,
    object_type: ObjectType,
) -> Result<BTreeMap<String, String>> {
    let Some(data) = document.get("data").and_then(JsonValue::as_object) else {
        return Ok(BTreeMap::new());
    };
    data.iter()
        .map(|(k, v)| {
            let raw = v
                .as_str()
                .ok_or_else(|| BindingError::InvalidSecretData(k.clone()))?;
            let value = match object_type {
                ObjectType::Secret => {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(raw)
                        .map_err(|_| BindingError::InvalidSecretData(k.clone()))?;
                    String::from_utf8_lossy(&bytes).into_owned()
                }
                ObjectType::ConfigMap => raw.to_string(),
            };
            Ok((k.clone(), value))
        })
        .collect()
}

/// Split `k=v,k=v`, keeping commas inside `{...}` (the path) intact.
fn parse_options(key: &str, value: &str) -> Result<Options> {
    let mut options = Options::default();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);

    for part in parts.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
        let (k, v) = part.split_once('=').ok_or_else(|| {
            BindingError::InvalidAnnotation(format!("{}: malformed option '{}'", key, part))
        })?;
        let v = v.trim().to_string();
        match k.trim() {
            "path" => options.path = Some(v),
            "objectType" => options.object_type = Some(v),
            "elementType" => options.element_type = Some(v),
            "sourceKey" => options.source_key = Some(v),
            "sourceValue" => options.source_value = Some(v),
            "optional" => options.optional = v == "true",
            other => {
                return Err(BindingError::InvalidAnnotation(format!(
                    "{}: unknown option '{}'",
                    key, other
                )))
            }
        }
    }

    Ok(options)
}
