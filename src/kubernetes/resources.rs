// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! API resources the operator addresses without discovery.

use crate::constants::annotations;
use crate::types::{ClusterWorkloadResourceMapping, ServiceBinding};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ApiResource;
use kube::core::GroupVersionKind;

pub fn secret() -> ApiResource {
    ApiResource::erase::<Secret>(&())
}

pub fn config_map() -> ApiResource {
    ApiResource::erase::<ConfigMap>(&())
}

pub fn service() -> ApiResource {
    ApiResource::erase::<Service>(&())
}

pub fn route() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("route.openshift.io", "v1", "Route"),
        "routes",
    )
}

pub fn custom_resource_definition() -> ApiResource {
    ApiResource::erase::<CustomResourceDefinition>(&())
}

pub fn service_binding() -> ApiResource {
    ApiResource::erase::<ServiceBinding>(&())
}

pub fn workload_resource_mapping() -> ApiResource {
    ApiResource::erase::<ClusterWorkloadResourceMapping>(&())
}

/// A resource kind that exposes binding data by its shape alone, together
/// with the annotations that describe that data.
pub struct WellKnownResource {
    pub resource: fn() -> ApiResource,
    pub annotations: &'static [(&'static str, &'static str)],
}

/// Resources owned by a backing service that are bound without annotations.
pub static WELL_KNOWN_RESOURCES: &[WellKnownResource] = &[
    WellKnownResource {
        resource: secret,
        annotations: &[(annotations::BINDING, "path={.metadata.name},objectType=Secret")],
    },
    WellKnownResource {
        resource: config_map,
        annotations: &[(annotations::BINDING, "path={.metadata.name},objectType=ConfigMap")],
    },
    WellKnownResource {
        resource: service,
        annotations: &[("service.binding/host", "path={.spec.clusterIP}")],
    },
    WellKnownResource {
        resource: route,
        annotations: &[("service.binding/host", "path={.spec.host}")],
    },
];

/// True when the resource is a core/v1 Secret.
pub fn is_secret(resource: &ApiResource) -> bool {
    resource.group.is_empty() && resource.kind == "Secret"
}
