// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::BindingError;
use crate::jsonpath::JsonPath;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Describes where containers, env and volumes live in a workload resource
/// that is not shaped like a PodSpec template.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "servicebinding.io",
    version = "v1beta1",
    kind = "ClusterWorkloadResourceMapping"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkloadResourceMappingSpec {
    pub versions: Vec<ClusterWorkloadResourceMappingTemplate>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkloadResourceMappingTemplate {
    /// Version of the workload resource, `*` matches any version
    #[serde(default)]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
    #[serde(default)]
    pub containers: Vec<ClusterWorkloadResourceMappingContainer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkloadResourceMappingContainer {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    Required,
    Invalid,
    Duplicate,
}

/// A validation failure attached to a field path, as reported on admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub field: String,
    pub detail: String,
}

impl FieldError {
    fn new(kind: FieldErrorKind, field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}: {}", self.field, self.kind, self.detail)
    }
}

impl ClusterWorkloadResourceMappingSpec {
    /// Validate every version entry. Returns all field errors found.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (i, template) in self.versions.iter().enumerate() {
            let field = format!("spec.versions[{}]", i);
            errors.extend(template.validate(&field));
            if !template.version.trim().is_empty() && !seen.insert(template.version.as_str()) {
                errors.push(FieldError::new(
                    FieldErrorKind::Duplicate,
                    &field,
                    format!("version {} is declared more than once", template.version),
                ));
            }
        }

        errors
    }

    /// Template for the given workload version, falling back to the `*` entry.
    pub fn template_for(&self, version: &str) -> Option<&ClusterWorkloadResourceMappingTemplate> {
        self.versions
            .iter()
            .find(|t| t.version == version)
            .or_else(|| self.versions.iter().find(|t| t.version == "*"))
    }
}

impl ClusterWorkloadResourceMappingTemplate {
    pub fn validate(&self, field: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.version.is_empty() {
            errors.push(FieldError::new(
                FieldErrorKind::Required,
                format!("{}.version", field),
                "version is required",
            ));
        } else if self.version.trim().is_empty() {
            errors.push(FieldError::new(
                FieldErrorKind::Invalid,
                format!("{}.version", field),
                "version must not be blank",
            ));
        }

        if let Some(annotations) = &self.annotations {
            check_fixed(&mut errors, format!("{}.annotations", field), annotations);
        }
        if let Some(volumes) = &self.volumes {
            check_fixed(&mut errors, format!("{}.volumes", field), volumes);
        }

        for (i, container) in self.containers.iter().enumerate() {
            let field = format!("{}.containers[{}]", field, i);
            if container.path.trim().is_empty() {
                errors.push(FieldError::new(
                    FieldErrorKind::Required,
                    format!("{}.path", field),
                    "path is required",
                ));
            } else if let Err(e) = JsonPath::parse(&container.path) {
                errors.push(FieldError::new(
                    FieldErrorKind::Invalid,
                    format!("{}.path", field),
                    format!("Invalid JSONPath: {}", e),
                ));
            }
            for (name, value) in [
                ("name", &container.name),
                ("env", &container.env),
                ("volumeMounts", &container.volume_mounts),
            ] {
                if let Some(value) = value {
                    check_fixed(&mut errors, format!("{}.{}", field, name), value);
                }
            }
        }

        errors
    }
}

fn check_fixed(errors: &mut Vec<FieldError>, field: String, expr: &str) {
    match JsonPath::parse_fixed(expr) {
        Ok(_) => {}
        Err(BindingError::InvalidFixedPath(_)) => errors.push(FieldError::new(
            FieldErrorKind::Invalid,
            field,
            format!("Invalid fixed JSONPath: {}", expr),
        )),
        Err(e) => errors.push(FieldError::new(
            FieldErrorKind::Invalid,
            field,
            format!("Unable to parse fixed JSONPath: {}", e),
        )),
    }
}
