// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::Result;
use crate::types::{BindingPath, BoundApplication};
use crate::workload::WorkloadMapping;
use kube::api::{ApiResource, DynamicObject};
use serde_json::Value;

/// A workload receiving the binding. Handlers mutate `resource`; the copy
/// read from the cluster is kept to detect changes.
pub struct Application {
    pub resource: Value,
    persisted: Value,
    pub api_resource: ApiResource,
    pub mapping: WorkloadMapping,
    /// Selected by a label selector rather than by name
    pub selected_by_label: bool,
    pub binding_path: Option<BindingPath>,
}

impl Application {
    pub fn new(
        resource: Value,
        api_resource: ApiResource,
        mapping: WorkloadMapping,
        selected_by_label: bool,
        binding_path: Option<BindingPath>,
    ) -> Self {
        Application {
            persisted: resource.clone(),
            resource,
            api_resource,
            mapping,
            selected_by_label,
            binding_path,
        }
    }

    pub fn is_updated(&self) -> bool {
        self.resource != self.persisted
    }

    pub fn name(&self) -> &str {
        self.resource
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Custom string field receiving the secret name instead of containers.
    pub fn secret_path(&self) -> Option<&str> {
        self.binding_path
            .as_ref()
            .and_then(|p| p.secret_path.as_deref())
            .filter(|p| !p.is_empty())
    }

    pub fn to_object(&self) -> Result<DynamicObject> {
        Ok(serde_json::from_value(self.resource.clone())?)
    }

    pub fn bound(&self) -> BoundApplication {
        BoundApplication {
            group: self.api_resource.group.clone(),
            version: self.api_resource.version.clone(),
            kind: self.api_resource.kind.clone(),
            name: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_deployment;
    use k8s_openapi::api::apps::v1::Deployment;
    use serde_json::json;

    #[test]
    fn test_is_updated_tracks_mutation() {
        let mut app = Application::new(
            make_deployment("app", &[]),
            ApiResource::erase::<Deployment>(&()),
            WorkloadMapping::default(),
            false,
            None,
        );
        assert!(!app.is_updated());

        app.resource["spec"]["template"]["spec"]["containers"][0]["envFrom"] =
            json!([{"secretRef": {"name": "s"}}]);
        assert!(app.is_updated());

        let bound = app.bound();
        assert_eq!(
            (bound.group.as_str(), bound.kind.as_str(), bound.name.as_str()),
            ("apps", "Deployment", "app")
        );
        assert_eq!(app.to_object().unwrap().metadata.name.as_deref(), Some("app"));
    }
}
