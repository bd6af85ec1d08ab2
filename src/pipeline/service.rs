// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::binding::Definition;
use crate::error::Result;
use crate::kubernetes::resources::{self, WellKnownResource, WELL_KNOWN_RESOURCES};
use crate::kubernetes::ClusterAccess;
use kube::api::ApiResource;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// A resource owned by a backing service that is bindable by its shape.
pub struct OwnedResource {
    pub known: &'static WellKnownResource,
    pub resource: Value,
}

/// A backing service referenced by the binding, read fresh per reconciliation.
pub struct Service {
    pub resource: Value,
    pub api_resource: ApiResource,
    /// Key under which custom mappings see this service
    pub id: Option<String>,
    pub definitions: Vec<Definition>,
    crd: Option<Option<Value>>,
    owned: Option<Vec<OwnedResource>>,
}

impl Service {
    pub fn new(resource: Value, api_resource: ApiResource, id: Option<String>) -> Self {
        Service {
            resource,
            api_resource,
            id,
            definitions: Vec::new(),
            crd: None,
            owned: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata_str("uid")
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.resource.get("metadata")?.get(field)?.as_str()
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        annotations_of(&self.resource)
    }

    pub fn is_secret(&self) -> bool {
        resources::is_secret(&self.api_resource)
    }

    /// The CRD defining this service's kind, `None` for built-in kinds or
    /// when the definition is not readable as a CRD.
    pub async fn crd(&mut self, cluster: &dyn ClusterAccess) -> Result<Option<&Value>> {
        if self.crd.is_none() {
            self.crd = Some(self.fetch_crd(cluster).await?);
        }
        Ok(self.crd.as_ref().and_then(Option::as_ref))
    }

    async fn fetch_crd(&self, cluster: &dyn ClusterAccess) -> Result<Option<Value>> {
        if self.api_resource.group.is_empty() {
            return Ok(None);
        }
        let name = format!("{}.{}", self.api_resource.plural, self.api_resource.group);
        match cluster
            .get(&resources::custom_resource_definition(), None, &name)
            .await
        {
            Ok(crd) => Ok(Some(serde_json::to_value(crd)?)),
            Err(e) if e.is_not_found() => {
                debug!("No CRD {} for service {}", name, self.name());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Well-known resources in the service's namespace that name this
    /// service as owner.
    pub async fn owned_resources(
        &mut self,
        cluster: &dyn ClusterAccess,
    ) -> Result<&[OwnedResource]> {
        if self.owned.is_none() {
            self.owned = Some(self.fetch_owned(cluster).await?);
        }
        Ok(self.owned.as_deref().unwrap_or_default())
    }

    async fn fetch_owned(&self, cluster: &dyn ClusterAccess) -> Result<Vec<OwnedResource>> {
        let Some(uid) = self.uid() else {
            return Ok(Vec::new());
        };

        let mut owned = Vec::new();
        for known in WELL_KNOWN_RESOURCES {
            let api_resource = (known.resource)();
            let objects = match cluster.list(&api_resource, self.namespace(), None).await {
                Ok(objects) => objects,
                // Kinds like Route only exist on some clusters
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for object in objects {
                let is_owned = object
                    .metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs.iter().any(|r| r.uid == uid));
                if is_owned {
                    owned.push(OwnedResource {
                        known,
                        resource: serde_json::to_value(object)?,
                    });
                }
            }
        }
        debug!("Service {} owns {} bindable resources", self.name(), owned.len());
        Ok(owned)
    }
}

/// Annotations of a resource document as a map.
pub fn annotations_of(resource: &Value) -> BTreeMap<String, String> {
    resource
        .pointer("/metadata/annotations")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_service_resource, FakeCluster};
    use serde_json::json;

    fn make_service() -> Service {
        Service::new(
            make_service_resource(json!({"foo": "val1"}), &[]),
            FakeCluster::database_resource(),
            Some("db".to_string()),
        )
    }

    #[tokio::test]
    async fn test_crd_lookup_by_plural_and_group() {
        let cluster = FakeCluster::new().with_object(
            &resources::custom_resource_definition(),
            json!({
                "apiVersion": "apiextensions.k8s.io/v1",
                "kind": "CustomResourceDefinition",
                "metadata": {
                    "name": "databases.postgres.example.com",
                    "annotations": {"service.binding/port": "path={.status.port}"}
                }
            }),
        );
        let mut service = make_service();

        let crd = service.crd(&cluster).await.unwrap().cloned().unwrap();

        assert_eq!(
            annotations_of(&crd).get("service.binding/port").map(String::as_str),
            Some("path={.status.port}")
        );
    }

    #[tokio::test]
    async fn test_missing_crd_is_none() {
        let mut service = make_service();
        assert!(service.crd(&FakeCluster::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owned_resources_match_owner_uid() {
        let owner = json!([{
            "apiVersion": "postgres.example.com/v1",
            "kind": "Database",
            "name": "db",
            "uid": "db-uid",
        }]);
        let other = json!([{"apiVersion": "v1", "kind": "Pod", "name": "p", "uid": "other"}]);
        let cluster = FakeCluster::new()
            .with_object(
                &resources::config_map(),
                json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": "owned", "namespace": "apps", "ownerReferences": owner},
                    "data": {"host": "db"},
                }),
            )
            .with_object(
                &resources::config_map(),
                json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {
                        "name": "unrelated",
                        "namespace": "apps",
                        "ownerReferences": other,
                    },
                }),
            );
        let mut service = make_service();

        let owned = service.owned_resources(&cluster).await.unwrap();

        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].resource["metadata"]["name"], json!("owned"));
        assert_eq!((owned[0].known.resource)().kind, "ConfigMap");
    }
}
