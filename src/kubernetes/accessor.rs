// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Untyped access to cluster resources.
//!
//! The binding pipeline works on resources whose schema it does not know, so
//! everything goes through [`DynamicObject`] addressed by an [`ApiResource`].

use crate::constants::OPERATOR_NAME;
use crate::error::{BindingError, Result};
use async_trait::async_trait;
use kube::{
    api::{ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::{GroupVersionKind, Selector},
    discovery::{pinned_kind, Discovery},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::{debug, instrument};

/// Group/version plus either a kind or a resource (plural) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub group: String,
    pub version: String,
    pub kind: Option<String>,
    pub resource: Option<String>,
}

impl ResourceRef {
    fn describe(&self) -> String {
        format!(
            "{}/{} {}",
            self.group,
            self.version,
            self.kind
                .as_deref()
                .or(self.resource.as_deref())
                .unwrap_or("<unset>")
        )
    }
}

#[async_trait]
pub trait ClusterAccess: Send + Sync {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&Selector>,
    ) -> Result<Vec<DynamicObject>>;

    /// Replace an object, relying on its resourceVersion for optimistic concurrency.
    async fn update(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject>;

    /// Create or update an object owned by this operator (server-side apply).
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject>;

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<()>;

    async fn resource_for_kind(&self, gvk: &GroupVersionKind) -> Result<ApiResource>;

    async fn resource_for_plural(
        &self,
        group: &str,
        version: &str,
        plural: &str,
    ) -> Result<ApiResource>;

    async fn resource_for_referable(&self, reference: &ResourceRef) -> Result<ApiResource> {
        match (&reference.kind, &reference.resource) {
            (Some(kind), _) if !kind.is_empty() => {
                self.resource_for_kind(&GroupVersionKind::gvk(
                    &reference.group,
                    &reference.version,
                    kind,
                ))
                .await
            }
            (_, Some(plural)) if !plural.is_empty() => {
                self.resource_for_plural(&reference.group, &reference.version, plural)
                    .await
            }
            _ => Err(BindingError::UnknownResource(reference.describe())),
        }
    }
}

/// [`ClusterAccess`] backed by a live API server.
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

#[async_trait]
impl ClusterAccess for KubeAccessor {
    #[instrument(skip(self, resource), fields(kind = %resource.kind))]
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        Ok(self.api(resource, namespace).get(name).await?)
    }

    #[instrument(skip(self, resource), fields(kind = %resource.kind))]
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&Selector>,
    ) -> Result<Vec<DynamicObject>> {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels_from(selector);
        }
        Ok(self.api(resource, namespace).list(&lp).await?.items)
    }

    #[instrument(
        skip(self, resource, object),
        fields(kind = %resource.kind, name = %object.name_any())
    )]
    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let api = self.api(resource, object.namespace().as_deref());
        Ok(api
            .replace(&object.name_any(), &PostParams::default(), object)
            .await?)
    }

    #[instrument(
        skip(self, resource, object),
        fields(kind = %resource.kind, name = %object.name_any())
    )]
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(resource, object.namespace().as_deref());
        let pp = PatchParams::apply(OPERATOR_NAME).force();
        Ok(api
            .patch(&object.name_any(), &pp, &Patch::Apply(object))
            .await?)
    }

    #[instrument(skip(self, resource, status), fields(kind = %resource.kind))]
    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<()> {
        let patch = json!({ "status": status });
        self.api(resource, Some(namespace))
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn resource_for_kind(&self, gvk: &GroupVersionKind) -> Result<ApiResource> {
        let (resource, _) = pinned_kind(&self.client, gvk).await?;
        debug!("Resolved {:?} to resource {}", gvk, resource.plural);
        Ok(resource)
    }

    async fn resource_for_plural(
        &self,
        group: &str,
        version: &str,
        plural: &str,
    ) -> Result<ApiResource> {
        let discovery = Discovery::new(self.client.clone())
            .filter(&[group])
            .run()
            .await?;

        for api_group in discovery.groups() {
            if api_group.name() == group {
                for (ar, _) in api_group.versioned_resources(version) {
                    if ar.plural == plural {
                        return Ok(ar);
                    }
                }
            }
        }

        Err(BindingError::UnknownResource(format!(
            "{}/{} {}",
            group, version, plural
        )))
    }
}
