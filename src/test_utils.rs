// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock API server for [`KubeAccessor`] and an in-memory
//! [`ClusterAccess`] for the binding pipeline.
//!
//! [`KubeAccessor`]: crate::kubernetes::KubeAccessor

use crate::error::{BindingError, Result};
use crate::kubernetes::{resources, ClusterAccess};
use crate::types::{
    ApplicationRef, ServiceBinding, ServiceBindingSpec, ServiceBindingStatus, ServiceRef,
};
use async_trait::async_trait;
use base64::Engine;
use http::{Request, Response};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};
use kube::client::Body;
use kube::core::{ErrorResponse, GroupVersionKind, Selector, SelectorExt};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A mock HTTP service answering requests from a table of
/// `(method, path)` responses. Unmatched requests get a 404.
#[derive(Clone, Default)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.respond("GET", path, status, body)
    }

    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<
            dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>>
                + Send,
        >,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let key = (req.method().to_string(), req.uri().path().to_string());
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| (404, not_found_json("object", &key.1)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Body of a 404 Status response
pub fn not_found_json(resource: &str, name: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

type ObjectKey = (String, String, Option<String>, String);

fn key(resource: &ApiResource, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        resource.group.clone(),
        resource.kind.clone(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

fn not_found(resource: &ApiResource, name: &str) -> BindingError {
    BindingError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} \"{}\" not found", resource.plural, name),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

fn encode(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    statuses: BTreeMap<(String, String), Value>,
    writes: Vec<String>,
}

/// In-memory cluster. Clones share their state, so a test can keep a handle
/// while the pipeline owns another.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The custom resource used as backing service throughout the tests
    pub fn database_resource() -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk("postgres.example.com", "v1", "Database"),
            "databases",
        )
    }

    fn known_resources() -> Vec<ApiResource> {
        vec![
            resources::secret(),
            resources::config_map(),
            resources::service(),
            resources::route(),
            resources::custom_resource_definition(),
            resources::service_binding(),
            resources::workload_resource_mapping(),
            ApiResource::erase::<Deployment>(&()),
            Self::database_resource(),
        ]
    }

    pub fn with_object(self, resource: &ApiResource, object: Value) -> Self {
        let object: DynamicObject = serde_json::from_value(object).unwrap();
        let k = key(resource, object.namespace().as_deref(), &object.name_any());
        self.state.lock().unwrap().objects.insert(k, object);
        self
    }

    pub fn with_secret(self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let data: BTreeMap<&str, String> = data.iter().map(|(k, v)| (*k, encode(v))).collect();
        self.with_object(
            &resources::secret(),
            json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": name, "namespace": namespace},
                "data": data,
            }),
        )
    }

    pub fn with_config_map(self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let data: BTreeMap<&str, &str> = data.iter().copied().collect();
        self.with_object(
            &resources::config_map(),
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": name, "namespace": namespace},
                "data": data,
            }),
        )
    }

    pub fn with_deployment(self, deployment: Value) -> Self {
        self.with_object(&ApiResource::erase::<Deployment>(&()), deployment)
    }

    /// Writes in the order they happened, as `<verb> <Kind> <ns>/<name>`
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn status_of(&self, namespace: &str, name: &str) -> Option<ServiceBindingStatus> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(&(namespace.to_string(), name.to_string()))
            .map(|s| serde_json::from_value(s.clone()).unwrap())
    }

    pub fn object(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        let state = self.state.lock().unwrap();
        state.objects.get(&key(resource, namespace, name)).cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Value> {
        self.object(&ApiResource::erase::<Deployment>(&()), Some(namespace), name)
            .map(|d| serde_json::to_value(d).unwrap())
    }

    /// The binding as the next reconciliation would see it
    pub fn binding_with_status(&self, mut binding: ServiceBinding) -> ServiceBinding {
        binding.status =
            self.status_of(&binding.namespace().unwrap_or_default(), &binding.name_any());
        binding
    }

    fn store(&self, verb: &str, resource: &ApiResource, object: DynamicObject) -> DynamicObject {
        let namespace = object.namespace();
        let name = object.name_any();
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!(
            "{} {} {}/{}",
            verb,
            resource.kind,
            namespace.as_deref().unwrap_or_default(),
            name
        ));
        state
            .objects
            .insert(key(resource, namespace.as_deref(), &name), object.clone());
        object
    }
}

fn labels_match(object: &DynamicObject, selector: Option<&Selector>) -> bool {
    selector.map_or(true, |selector| selector.matches(object.labels()))
}

#[async_trait]
impl ClusterAccess for FakeCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.object(resource, namespace, name)
            .ok_or_else(|| not_found(resource, name))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&Selector>,
    ) -> Result<Vec<DynamicObject>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|((group, kind, ns, _), _)| {
                *group == resource.group
                    && *kind == resource.kind
                    && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|(_, object)| object)
            .filter(|object| labels_match(object, label_selector))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        if self.object(resource, object.namespace().as_deref(), &object.name_any()).is_none() {
            return Err(not_found(resource, &object.name_any()));
        }
        Ok(self.store("update", resource, object.clone()))
    }

    /// Stores `stringData` the way the API server does, base64 encoded
    /// under `data`.
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        let mut object = object.clone();
        if let Some(string_data) = object.data.get("stringData").and_then(Value::as_object) {
            let data: serde_json::Map<String, Value> = string_data
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), Value::String(encode(v.as_str()?)))))
                .collect();
            object.data["data"] = Value::Object(data);
        }
        Ok(self.store("apply", resource, object))
    }

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .writes
            .push(format!("status {} {}/{}", resource.kind, namespace, name));
        state
            .statuses
            .insert((namespace.to_string(), name.to_string()), status);
        Ok(())
    }

    async fn resource_for_kind(&self, gvk: &GroupVersionKind) -> Result<ApiResource> {
        Self::known_resources()
            .into_iter()
            .find(|ar| ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind)
            .ok_or_else(|| BindingError::UnknownResource(format!("{:?}", gvk)))
    }

    async fn resource_for_plural(
        &self,
        group: &str,
        version: &str,
        plural: &str,
    ) -> Result<ApiResource> {
        Self::known_resources()
            .into_iter()
            .find(|ar| ar.group == group && ar.version == version && ar.plural == plural)
            .ok_or_else(|| {
                BindingError::UnknownResource(format!("{}/{} {}", group, version, plural))
            })
    }
}

/// Binding `my-binding` in `apps` of the given services to Deployment `app`
pub fn make_binding_for(services: Vec<ServiceRef>, bind_as_files: bool) -> ServiceBinding {
    ServiceBinding {
        metadata: ObjectMeta {
            name: Some("my-binding".to_string()),
            namespace: Some("apps".to_string()),
            uid: Some("binding-uid".to_string()),
            ..Default::default()
        },
        spec: ServiceBindingSpec {
            services,
            application: Some(ApplicationRef {
                group: "apps".to_string(),
                version: "v1".to_string(),
                kind: Some("Deployment".to_string()),
                name: Some("app".to_string()),
                ..Default::default()
            }),
            bind_as_files,
            ..Default::default()
        },
        status: None,
    }
}

/// Binding of Database `db` to Deployment `app`
pub fn make_binding(bind_as_files: bool) -> ServiceBinding {
    make_binding_for(
        vec![ServiceRef {
            group: "postgres.example.com".to_string(),
            version: "v1".to_string(),
            kind: Some("Database".to_string()),
            name: "db".to_string(),
            ..Default::default()
        }],
        bind_as_files,
    )
}

/// Database `db` in `apps` with the given status and annotations
pub fn make_service_resource(status: Value, annotations: &[(&str, &str)]) -> Value {
    let mut metadata = json!({"name": "db", "namespace": "apps", "uid": "db-uid"});
    if !annotations.is_empty() {
        let annotations: BTreeMap<&str, &str> = annotations.iter().copied().collect();
        metadata["annotations"] = json!(annotations);
    }
    json!({
        "apiVersion": "postgres.example.com/v1",
        "kind": "Database",
        "metadata": metadata,
        "status": status,
    })
}

/// Deployment in `apps` with a single container `web`
pub fn make_deployment(name: &str, labels: &[(&str, &str)]) -> Value {
    let mut metadata = json!({"name": name, "namespace": "apps"});
    if !labels.is_empty() {
        let labels: BTreeMap<&str, &str> = labels.iter().copied().collect();
        metadata["labels"] = json!(labels);
    }
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata,
        "spec": {"template": {"spec": {"containers": [{"name": "web", "image": "foo"}]}}},
    })
}
