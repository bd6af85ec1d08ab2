// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup gate on the ServiceBinding CRD.

use super::{resources, ClusterAccess};
use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::ServiceBinding;
use kube::Resource;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

fn binding_crd_name() -> String {
    format!("{}.{}", ServiceBinding::plural(&()), ServiceBinding::group(&()))
}

/// Block until the ServiceBinding CRD is established and serves the version
/// this operator speaks, polling with exponential backoff.
pub async fn wait_for_binding_crd(cluster: &dyn ClusterAccess) -> Result<()> {
    let name = binding_crd_name();
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match binding_crd_established(cluster).await {
            Ok(true) => {
                info!("CRD {} is established", name);
                return Ok(());
            }
            Ok(false) => info!("CRD {} not established yet, checking again in {}s", name, interval),
            Err(e) => warn!("Unable to read CRD {}: {}, checking again in {}s", name, e, interval),
        }

        sleep(Duration::from_secs(interval)).await;
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// True once the CRD exists, reports `Established` and serves our version.
pub async fn binding_crd_established(cluster: &dyn ClusterAccess) -> Result<bool> {
    let crd = match cluster
        .get(&resources::custom_resource_definition(), None, &binding_crd_name())
        .await
    {
        Ok(crd) => crd,
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    };

    let version = ServiceBinding::version(&());
    let served = list(&crd.data, "/spec/versions").any(|v| {
        v.get("name").and_then(Value::as_str) == Some(&*version)
            && v.get("served").and_then(Value::as_bool) == Some(true)
    });
    let established = list(&crd.data, "/status/conditions").any(|c| {
        c.get("type").and_then(Value::as_str) == Some("Established")
            && c.get("status").and_then(Value::as_str) == Some("True")
    });
    Ok(served && established)
}

fn list<'a>(doc: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    doc.pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCluster;
    use kube::api::ApiResource;
    use serde_json::json;

    fn crd_resource() -> ApiResource {
        resources::custom_resource_definition()
    }

    fn make_crd(served: bool, established: &str) -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "servicebindings.binding.operators.coreos.com"},
            "spec": {"versions": [{"name": "v1alpha1", "served": served, "storage": true}]},
            "status": {"conditions": [{"type": "Established", "status": established}]}
        })
    }

    #[tokio::test]
    async fn test_missing_crd_is_not_established() {
        assert!(!binding_crd_established(&FakeCluster::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_established_and_served() {
        let cluster = FakeCluster::new().with_object(&crd_resource(), make_crd(true, "True"));
        assert!(binding_crd_established(&cluster).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_yet_established_or_not_served() {
        let pending = FakeCluster::new().with_object(&crd_resource(), make_crd(true, "False"));
        assert!(!binding_crd_established(&pending).await.unwrap());

        let unserved = FakeCluster::new().with_object(&crd_resource(), make_crd(false, "True"));
        assert!(!binding_crd_established(&unserved).await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_returns_once_established() {
        let cluster = FakeCluster::new().with_object(&crd_resource(), make_crd(true, "True"));
        wait_for_binding_crd(&cluster).await.unwrap();
    }
}
