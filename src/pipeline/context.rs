// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! State of one reconciliation of a ServiceBinding.
//!
//! Services and applications are read lazily, the first time a handler asks
//! for them. Everything the handlers produce is written back in [`Context::close`].

use super::application::Application;
use super::service::Service;
use super::Outcome;
use crate::binding::{object_data, BindingItem, BindingItems, ObjectType};
use crate::constants::{conditions, reasons};
use crate::error::{BindingError, Result};
use crate::kubernetes::{resources, ClusterAccess};
use crate::types::{
    ApplicationRef, ClusterWorkloadResourceMapping, Condition, ServiceBinding, ServiceBindingStatus,
};
use crate::workload::WorkloadMapping;
use kube::api::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Bind,
    Unbind,
}

#[derive(Default)]
struct Flow {
    stop: bool,
    retry: bool,
    delay: bool,
    error: Option<BindingError>,
}

pub struct Context {
    binding: ServiceBinding,
    cluster: Arc<dyn ClusterAccess>,
    mode: Mode,
    services: Option<Vec<Service>>,
    applications: Option<Vec<Application>>,
    items: BindingItems,
    conditions: Vec<Condition>,
    flow: Flow,
}

impl Context {
    pub fn new(binding: ServiceBinding, cluster: Arc<dyn ClusterAccess>, mode: Mode) -> Self {
        Context {
            binding,
            cluster,
            mode,
            services: None,
            applications: None,
            items: BindingItems::new(),
            conditions: Vec::new(),
            flow: Flow::default(),
        }
    }

    pub fn binding(&self) -> &ServiceBinding {
        &self.binding
    }

    pub fn cluster(&self) -> Arc<dyn ClusterAccess> {
        self.cluster.clone()
    }

    pub fn is_unbind(&self) -> bool {
        self.mode == Mode::Unbind
    }

    pub fn binding_name(&self) -> String {
        self.binding.name_any()
    }

    pub fn namespace(&self) -> String {
        self.binding.namespace_or_default()
    }

    pub async fn services(&mut self) -> Result<&mut [Service]> {
        if self.services.is_none() {
            self.services = Some(self.load_services().await?);
        }
        Ok(self.services.get_or_insert_with(Vec::new))
    }

    pub async fn applications(&mut self) -> Result<&mut [Application]> {
        if self.applications.is_none() {
            self.applications = Some(self.load_applications().await?);
        }
        Ok(self.applications.get_or_insert_with(Vec::new))
    }

    pub fn items(&self) -> &BindingItems {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut BindingItems {
        &mut self.items
    }

    pub fn add_item(&mut self, item: BindingItem) {
        self.items.push(item);
    }

    /// Name of the secret materializing the current items.
    pub fn binding_secret_name(&self) -> String {
        self.items.secret_name(&self.binding_name())
    }

    /// Record a condition, replacing an earlier one of the same type.
    pub fn set_condition(&mut self, condition: Condition) {
        upsert(&mut self.conditions, condition);
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.condition_type == condition_type)
    }

    pub fn stop_processing(&mut self) {
        self.flow.stop = true;
    }

    /// Halt and ask for the whole reconciliation to be retried.
    pub fn retry_processing(&mut self, err: BindingError) {
        self.flow.stop = true;
        self.flow.retry = true;
        self.error(err);
    }

    /// Ask to be reconciled again later without failing this run.
    pub fn delay_reprocessing(&mut self, err: Option<BindingError>) {
        self.flow.delay = true;
        if let Some(err) = err {
            self.error(err);
        }
    }

    /// Record an error. The first one reported wins.
    pub fn error(&mut self, err: BindingError) {
        if self.flow.error.is_none() {
            self.flow.error = Some(err);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.flow.stop
    }

    /// Persist the outcome: binding secret first, then the changed
    /// applications, then the binding status.
    pub async fn close(&mut self) -> Result<()> {
        let collected = !self.is_unbind()
            && self
                .condition(conditions::COLLECTION_READY)
                .is_some_and(Condition::is_true);

        let mut secret = self.binding.secret_name().map(str::to_string);
        if collected {
            let name = self.binding_secret_name();
            self.write_secret(&name).await?;
            secret = Some(name);
        }

        if let Some(applications) = &self.applications {
            for app in applications.iter().filter(|a| a.is_updated()) {
                info!("Updating {} {}", app.api_resource.kind, app.name());
                self.cluster.update(&app.api_resource, &app.to_object()?).await?;
            }
        }

        if self.is_unbind() {
            return Ok(());
        }
        self.write_status(secret, collected).await
    }

    pub(crate) fn into_outcome(self, closed: Result<()>) -> Outcome {
        let Flow {
            stop,
            retry,
            delay,
            error,
        } = self.flow;
        match closed {
            Err(e) => Outcome {
                retry: true,
                delay,
                error: Some(e),
            },
            Ok(()) => Outcome {
                retry: retry || (stop && error.is_some()),
                delay,
                error,
            },
        }
    }

    async fn load_services(&self) -> Result<Vec<Service>> {
        let namespace = self.namespace();
        let mut services = Vec::with_capacity(self.binding.spec.services.len());
        for service_ref in &self.binding.spec.services {
            let api_resource = self
                .cluster
                .resource_for_referable(&service_ref.resource_ref())
                .await?;
            let ns = service_ref.namespace.as_deref().unwrap_or(&namespace);
            let object = self.cluster.get(&api_resource, Some(ns), &service_ref.name).await?;
            debug!("Read service {} {}/{}", api_resource.kind, ns, service_ref.name);
            services.push(Service::new(
                serde_json::to_value(object)?,
                api_resource,
                service_ref.id.clone(),
            ));
        }
        Ok(services)
    }

    async fn load_applications(&self) -> Result<Vec<Application>> {
        let Some(app_ref) = &self.binding.spec.application else {
            return Ok(Vec::new());
        };
        let api_resource = self
            .cluster
            .resource_for_referable(&app_ref.resource_ref())
            .await?;
        let mapping = self.workload_mapping(&api_resource, app_ref).await?;
        let namespace = self.namespace();

        let (objects, selected_by_label) = match &app_ref.name {
            Some(name) => (
                vec![self.cluster.get(&api_resource, Some(&namespace), name).await?],
                false,
            ),
            None => match app_ref.selector()? {
                Some(selector) => (
                    self.cluster
                        .list(&api_resource, Some(&namespace), Some(&selector))
                        .await?,
                    true,
                ),
                None => {
                    return Err(BindingError::ApplicationRead(
                        "application needs a name or a label selector".to_string(),
                    ))
                }
            },
        };

        objects
            .into_iter()
            .map(|object| {
                Ok(Application::new(
                    serde_json::to_value(object)?,
                    api_resource.clone(),
                    mapping.clone(),
                    selected_by_label,
                    app_ref.binding_path.clone(),
                ))
            })
            .collect()
    }

    /// Mapping for the application's kind: a ClusterWorkloadResourceMapping
    /// named `<plural>.<group>` when one exists, Pod-shaped defaults otherwise.
    async fn workload_mapping(
        &self,
        api_resource: &ApiResource,
        app_ref: &ApplicationRef,
    ) -> Result<WorkloadMapping> {
        let name = if api_resource.group.is_empty() {
            api_resource.plural.clone()
        } else {
            format!("{}.{}", api_resource.plural, api_resource.group)
        };

        let mapping = match self
            .cluster
            .get(&resources::workload_resource_mapping(), None, &name)
            .await
        {
            Ok(object) => {
                let custom: ClusterWorkloadResourceMapping =
                    serde_json::from_value(serde_json::to_value(object)?)?;
                let errors = custom.spec.validate();
                if !errors.is_empty() {
                    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
                    return Err(BindingError::InvalidWorkloadMapping(format!(
                        "{}: {}",
                        name,
                        details.join("; ")
                    )));
                }
                match custom.spec.template_for(&api_resource.version) {
                    Some(template) => WorkloadMapping::from_template(template)?,
                    None => WorkloadMapping::default(),
                }
            }
            Err(e) if e.is_not_found() => WorkloadMapping::default(),
            Err(e) => return Err(e),
        };

        match app_ref
            .binding_path
            .as_ref()
            .and_then(|p| p.containers_path.as_deref())
        {
            Some(path) if !path.is_empty() => mapping.with_containers_path(path),
            _ => Ok(mapping),
        }
    }

    /// Apply the binding secret unless a secret with this name already holds
    /// the same data.
    async fn write_secret(&self, name: &str) -> Result<()> {
        let api_resource = resources::secret();
        let namespace = self.namespace();
        let data = self.items.as_map();

        match self.cluster.get(&api_resource, Some(&namespace), name).await {
            Ok(existing)
                if object_data(&existing.data, ObjectType::Secret)
                    .is_ok_and(|current| current == data) =>
            {
                debug!("Secret {} is up to date", name);
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut secret = DynamicObject::new(name, &api_resource).within(&namespace);
        secret.metadata.owner_references = self.binding.controller_owner_ref(&()).map(|r| vec![r]);
        secret.data = json!({ "stringData": data });
        info!("Writing binding secret {}/{} with {} keys", namespace, name, data.len());
        self.cluster.apply(&api_resource, &secret).await?;
        Ok(())
    }

    async fn write_status(&self, secret: Option<String>, collected: bool) -> Result<()> {
        let previous = self.binding.status.clone().unwrap_or_default();

        let mut merged = previous.conditions.clone();
        for condition in &self.conditions {
            upsert(&mut merged, condition.clone());
        }
        let ready = self.ready_condition(&merged);
        upsert(&mut merged, ready);

        let applications = match (&self.applications, collected) {
            (Some(apps), true) => apps.iter().map(Application::bound).collect(),
            _ => previous.applications.clone(),
        };

        let status = ServiceBindingStatus {
            conditions: merged,
            secret,
            applications,
        };
        if status == previous {
            debug!("Status of {} unchanged", self.binding_name());
            return Ok(());
        }

        self.cluster
            .patch_status(
                &resources::service_binding(),
                &self.namespace(),
                &self.binding_name(),
                serde_json::to_value(&status)?,
            )
            .await
    }

    fn ready_condition(&self, merged: &[Condition]) -> Condition {
        let find = |t: &str| merged.iter().find(|c| c.condition_type == t);
        let stages = [
            find(conditions::COLLECTION_READY),
            find(conditions::INJECTION_READY),
        ];
        if stages.iter().all(|c| c.is_some_and(Condition::is_true)) {
            return Condition::new(conditions::READY, true, reasons::APPLICATIONS_BOUND, "");
        }

        match stages.into_iter().flatten().find(|c| !c.is_true()) {
            Some(failed) => Condition::new(
                conditions::READY,
                false,
                failed.reason.as_deref().unwrap_or(reasons::PROCESSING_ERROR),
                failed.message.clone().unwrap_or_default(),
            ),
            None => {
                let (reason, message) = match &self.flow.error {
                    Some(e) => (e.reason(), e.to_string()),
                    None => (reasons::PROCESSING_ERROR, String::new()),
                };
                Condition::new(conditions::READY, false, reason, message)
            }
        }
    }
}

fn upsert(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_binding, make_deployment, FakeCluster};
    use serde_json::json;

    #[tokio::test]
    async fn test_close_writes_secret_before_applications() {
        let cluster = Arc::new(FakeCluster::new().with_deployment(make_deployment("app", &[])));
        let mut ctx = Context::new(make_binding(false), cluster.clone(), Mode::Bind);
        ctx.add_item(BindingItem::new("HOST", "db", None));
        ctx.set_condition(Condition::new(
            conditions::COLLECTION_READY,
            true,
            reasons::DATA_COLLECTED,
            "",
        ));
        let apps = ctx.applications().await.unwrap();
        apps[0].resource["metadata"]["labels"] = json!({"bound": "yes"});

        ctx.close().await.unwrap();

        let writes = cluster.writes();
        assert_eq!(writes[0], format!("apply Secret apps/{}", ctx.binding_secret_name()));
        assert_eq!(writes[1], "update Deployment apps/app");
        assert_eq!(writes[2], "status ServiceBinding apps/my-binding");
    }

    #[tokio::test]
    async fn test_close_skips_unchanged_secret() {
        let items: BindingItems = vec![BindingItem::new("HOST", "db", None)].into_iter().collect();
        let name = items.secret_name("my-binding");
        let cluster = Arc::new(FakeCluster::new().with_secret("apps", &name, &[("HOST", "db")]));
        let mut ctx = Context::new(make_binding(false), cluster.clone(), Mode::Bind);
        ctx.add_item(BindingItem::new("HOST", "db", None));
        ctx.set_condition(Condition::new(
            conditions::COLLECTION_READY,
            true,
            reasons::DATA_COLLECTED,
            "",
        ));

        ctx.close().await.unwrap();

        assert!(cluster.writes().iter().all(|w| !w.starts_with("apply")));
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let mut ctx = Context::new(make_binding(false), Arc::new(FakeCluster::new()), Mode::Bind);
        ctx.retry_processing(BindingError::ServiceRead("first".to_string()));
        ctx.error(BindingError::ServiceRead("second".to_string()));

        let outcome = ctx.into_outcome(Ok(()));

        assert!(outcome.retry);
        assert!(matches!(outcome.error, Some(BindingError::ServiceRead(m)) if m == "first"));
    }

    #[tokio::test]
    async fn test_close_error_forces_retry() {
        let ctx = Context::new(make_binding(false), Arc::new(FakeCluster::new()), Mode::Bind);
        let outcome = ctx.into_outcome(Err(BindingError::ApplicationRead("conflict".to_string())));
        assert!(outcome.retry);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_stop_without_error_is_not_retried() {
        let mut ctx = Context::new(make_binding(false), Arc::new(FakeCluster::new()), Mode::Bind);
        ctx.stop_processing();
        let outcome = ctx.into_outcome(Ok(()));
        assert!(!outcome.retry);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_ready_reflects_failed_stage() {
        let cluster = Arc::new(FakeCluster::new());
        let mut ctx = Context::new(make_binding(false), cluster.clone(), Mode::Bind);
        ctx.set_condition(Condition::new(
            conditions::COLLECTION_READY,
            false,
            reasons::INVALID_ANNOTATION,
            "bad annotation",
        ));

        ctx.close().await.unwrap();

        let status = cluster.status_of("apps", "my-binding").unwrap();
        let ready = status
            .conditions
            .iter()
            .find(|c| c.condition_type == conditions::READY)
            .unwrap();
        assert!(!ready.is_true());
        assert_eq!(ready.reason.as_deref(), Some(reasons::INVALID_ANNOTATION));
        assert_eq!(status.secret, None);
    }

    #[tokio::test]
    async fn test_invalid_workload_mapping() {
        let cluster = FakeCluster::new()
            .with_deployment(make_deployment("app", &[]))
            .with_object(
                &resources::workload_resource_mapping(),
                json!({
                    "apiVersion": "servicebinding.io/v1beta1",
                    "kind": "ClusterWorkloadResourceMapping",
                    "metadata": {"name": "deployments.apps"},
                    "spec": {"versions": [{
                        "version": "v1",
                        "containers": [{"path": ".spec.containers[*]", "name": ".name[*]"}],
                    }]}
                }),
            );
        let mut ctx = Context::new(make_binding(false), Arc::new(cluster), Mode::Bind);

        let err = ctx.applications().await.err().unwrap();

        assert!(matches!(err, BindingError::InvalidWorkloadMapping(_)));
    }

    #[tokio::test]
    async fn test_workload_mapping_by_plural_and_group() {
        let cluster = FakeCluster::new()
            .with_deployment(make_deployment("app", &[]))
            .with_object(
                &resources::workload_resource_mapping(),
                json!({
                    "apiVersion": "servicebinding.io/v1beta1",
                    "kind": "ClusterWorkloadResourceMapping",
                    "metadata": {"name": "deployments.apps"},
                    "spec": {"versions": [{
                        "version": "*",
                        "containers": [{"path": ".spec.template.spec.initContainers[*]"}],
                    }]}
                }),
            );
        let mut ctx = Context::new(make_binding(false), Arc::new(cluster), Mode::Bind);

        let apps = ctx.applications().await.unwrap();

        assert_eq!(
            apps[0].mapping.containers[0].path.expr(),
            ".spec.template.spec.initContainers[*]"
        );
    }
}
