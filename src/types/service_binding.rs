// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{conditions, naming};
use crate::error::{BindingError, Result};
use crate::kubernetes::ResourceRef;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::Selector;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "binding.operators.coreos.com", version = "v1alpha1", kind = "ServiceBinding")]
#[kube(namespaced)]
#[kube(status = "ServiceBindingStatus")]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingSpec {
    /// Explicit mount path of file bindings, bypasses SERVICE_BINDING_ROOT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    /// Naming strategy preset (`none`, `uppercase`, `lowercase`) or a template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_strategy: Option<String>,
    pub services: Vec<ServiceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationRef>,
    #[serde(default = "default_true")]
    pub bind_as_files: bool,
    /// Also bind well-known resources owned by the services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_binding_resources: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<Mapping>,
    /// Individual environment variables sourced from the binding secret
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvMapping>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    #[serde(default)]
    pub group: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Key under which the service is exposed to custom mappings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRef {
    #[serde(default)]
    pub group: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_path: Option<BindingPath>,
}

/// Custom locations inside the application resource
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindingPath {
    /// String field receiving the binding secret name instead of container injection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_path: Option<String>,
    /// Path of the container list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containers_path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
pub struct Mapping {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
pub struct EnvMapping {
    /// Environment variable name
    pub name: String,
    /// Key of the binding secret
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Name of the binding secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<BoundApplication>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Condition {
            condition_type: condition_type.to_string(),
            status: (if status { conditions::TRUE } else { conditions::FALSE }).to_string(),
            reason: Some(reason.to_string()),
            message: (!message.is_empty()).then_some(message),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == conditions::TRUE
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoundApplication {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
}

impl ServiceRef {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl ApplicationRef {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
            resource: self.resource.clone(),
        }
    }

    /// The label selector converted for list calls, `matchExpressions`
    /// included.
    pub fn selector(&self) -> Result<Option<Selector>> {
        self.label_selector
            .clone()
            .map(Selector::try_from)
            .transpose()
            .map_err(|e| BindingError::InvalidLabelSelector(e.to_string()))
    }
}

impl ServiceBinding {
    /// Check if the binding is ready based on its status conditions
    pub fn is_ready(&self) -> bool {
        self.condition(conditions::READY).is_some_and(Condition::is_true)
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.condition_type == condition_type))
    }

    /// Name of the secret materialized by the previous reconciliation
    pub fn secret_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.secret.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Resolved naming template: a preset, a custom template, or the default
    /// for the binding mode
    pub fn naming_template(&self) -> String {
        match self.spec.naming_strategy.as_deref().map(str::trim) {
            Some("none") => naming::NONE.to_string(),
            Some("uppercase") => naming::UPPERCASE.to_string(),
            Some("lowercase") => naming::LOWERCASE.to_string(),
            Some(custom) if !custom.is_empty() => custom.to_string(),
            _ if self.spec.bind_as_files => naming::NONE.to_string(),
            _ => naming::UPPERCASE.to_string(),
        }
    }

    /// True when the target workloads are selected by labels rather than by name
    pub fn has_label_selector(&self) -> bool {
        self.spec
            .application
            .as_ref()
            .is_some_and(|a| a.name.is_none() && a.label_selector.is_some())
    }

    pub fn detect_binding_resources(&self) -> bool {
        self.spec.detect_binding_resources.unwrap_or(false)
    }

    /// Namespace of the binding, which is also the default namespace of its services
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }
}
