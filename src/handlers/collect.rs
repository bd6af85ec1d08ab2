// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Handlers collecting binding items from the backing services.

use crate::binding::{self as data, read_data, BindingItem, Definition, ItemSource, ObjectType};
use crate::constants::{annotations, conditions, reasons};
use crate::error::BindingError;
use crate::pipeline::service::annotations_of;
use crate::pipeline::{Context, Handler, Service};
use crate::types::Condition;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn not_collected(ctx: &mut Context, reason: &str, message: impl Into<String>) {
    ctx.set_condition(Condition::new(conditions::COLLECTION_READY, false, reason, message));
}

fn is_binding_key(key: &str) -> bool {
    key == annotations::BINDING || key.starts_with(annotations::BINDING_PREFIX)
}

fn source_of(service: &Service) -> ItemSource {
    ItemSource {
        kind: service.kind().to_string(),
        name: service.name().to_string(),
    }
}

fn items_from(
    pairs: Vec<(String, String)>,
    source: &ItemSource,
) -> impl Iterator<Item = BindingItem> + '_ {
    pairs
        .into_iter()
        .map(move |(name, value)| BindingItem::new(name, value, Some(source.clone())))
}

/// Route a failure while resolving values to the matching flow decision.
fn resolution_failed(ctx: &mut Context, err: BindingError) {
    match &err {
        // Partial data is never bound
        BindingError::ValueNotFound(_)
        | BindingError::DataNotMap(_)
        | BindingError::InvalidSecretData(_) => {
            not_collected(ctx, err.reason(), err.to_string());
            ctx.stop_processing();
            ctx.error(err);
        }
        BindingError::PathNotFound(_) => {
            not_collected(ctx, reasons::ERROR_READING_BINDING, err.to_string());
            ctx.retry_processing(err);
        }
        BindingError::KubeError(_) => {
            not_collected(ctx, reasons::ERROR_READING_SECRET, err.to_string());
            ctx.retry_processing(err);
        }
        _ => {
            not_collected(ctx, err.reason(), err.to_string());
            ctx.stop_processing();
        }
    }
}

/// Read all services up front; nothing can be collected without them.
pub struct PreFlight;

#[async_trait]
impl Handler for PreFlight {
    fn name(&self) -> &'static str {
        "collect::PreFlight"
    }

    async fn handle(&self, ctx: &mut Context) {
        if let Some(err) = ctx.services().await.err() {
            let reason = if err.is_not_found() {
                reasons::SERVICE_NOT_FOUND
            } else {
                reasons::ERROR_READING_SERVICES
            };
            warn!("Unable to read services of {}: {}", ctx.binding_name(), err);
            not_collected(ctx, reason, err.to_string());
            ctx.retry_processing(BindingError::ServiceRead(err.to_string()));
        }
    }
}

/// Compile the `service.binding` annotations of every service and its CRD.
/// Service annotations win over CRD annotations with the same key.
pub struct BindingDefinitions;

#[async_trait]
impl Handler for BindingDefinitions {
    fn name(&self) -> &'static str {
        "collect::BindingDefinitions"
    }

    async fn handle(&self, ctx: &mut Context) {
        let cluster = ctx.cluster();
        let Ok(services) = ctx.services().await else {
            return;
        };

        let mut failure = None;
        for service in services.iter_mut() {
            let mut merged = BTreeMap::new();
            match service.crd(cluster.as_ref()).await {
                Ok(Some(crd)) => merged.extend(annotations_of(crd)),
                Ok(None) => {}
                Err(e) => {
                    failure = Some((reasons::ERROR_READING_CRD, e));
                    break;
                }
            }
            merged.extend(service.annotations());

            let built: Result<Vec<_>, _> = merged
                .iter()
                .filter(|(key, _)| is_binding_key(key))
                .map(|(key, value)| Definition::build(key, value))
                .collect();
            match built {
                Ok(definitions) => {
                    debug!(
                        "Service {} has {} binding definitions",
                        service.name(),
                        definitions.len()
                    );
                    service.definitions = definitions;
                }
                Err(e) => {
                    failure = Some((reasons::INVALID_ANNOTATION, e));
                    break;
                }
            }
        }

        match failure {
            Some((reasons::ERROR_READING_CRD, err)) => {
                not_collected(ctx, reasons::ERROR_READING_CRD, err.to_string());
                ctx.retry_processing(err);
            }
            Some((reason, err)) => {
                not_collected(ctx, reason, err.to_string());
                ctx.stop_processing();
            }
            None => {}
        }
    }
}

/// Apply the compiled definitions to their services.
pub struct BindingItems;

#[async_trait]
impl Handler for BindingItems {
    fn name(&self) -> &'static str {
        "collect::BindingItems"
    }

    async fn handle(&self, ctx: &mut Context) {
        let cluster = ctx.cluster();
        let Ok(services) = ctx.services().await else {
            return;
        };

        let mut collected = Vec::new();
        let mut failure = None;
        'services: for service in services.iter() {
            let source = source_of(service);
            for definition in &service.definitions {
                let value = match definition.apply(&service.resource, cluster.as_ref()).await {
                    Ok(value) => value,
                    Err(e) => {
                        failure = Some(e);
                        break 'services;
                    }
                };
                if definition.non_existing_optional(&value) {
                    debug!("Skipping optional {} of {}", definition.output_name(), service.name());
                    continue;
                }
                match value.flatten(service.name()) {
                    Ok(pairs) => collected.extend(items_from(pairs, &source)),
                    Err(e) => {
                        failure = Some(e);
                        break 'services;
                    }
                }
            }
        }

        match failure {
            Some(err) => resolution_failed(ctx, err),
            None => ctx.items_mut().extend(collected),
        }
    }
}

/// Bind well-known resources owned by the services, when the binding asks for it.
pub struct OwnedResources;

#[async_trait]
impl Handler for OwnedResources {
    fn name(&self) -> &'static str {
        "collect::OwnedResources"
    }

    async fn handle(&self, ctx: &mut Context) {
        if !ctx.binding().detect_binding_resources() {
            return;
        }
        let cluster = ctx.cluster();
        let Ok(services) = ctx.services().await else {
            return;
        };

        let mut collected = Vec::new();
        let mut failure = None;
        'services: for service in services.iter_mut() {
            let source = source_of(service);
            let owned = match service.owned_resources(cluster.as_ref()).await {
                Ok(owned) => owned,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            for resource in owned {
                for (key, value) in resource.known.annotations {
                    let result = match Definition::build(key, value) {
                        Ok(definition) => {
                            definition.apply(&resource.resource, cluster.as_ref()).await
                        }
                        Err(e) => Err(e),
                    };
                    let flattened = result.and_then(|v| v.flatten(&source.name));
                    match flattened {
                        Ok(pairs) => collected.extend(items_from(pairs, &source)),
                        // e.g. a headless Service without clusterIP
                        Err(BindingError::PathNotFound(path)) => {
                            debug!("Owned resource of {} has no {}", source.name, path);
                        }
                        Err(e) => {
                            failure = Some(e);
                            break 'services;
                        }
                    }
                }
            }
        }

        match failure {
            Some(err) => resolution_failed(ctx, err),
            None => ctx.items_mut().extend(collected),
        }
    }
}

/// Services following the provisioned service convention name their binding
/// secret in `status.binding.name`.
pub struct ProvisionedService;

#[async_trait]
impl Handler for ProvisionedService {
    fn name(&self) -> &'static str {
        "collect::ProvisionedService"
    }

    async fn handle(&self, ctx: &mut Context) {
        let cluster = ctx.cluster();
        let Ok(services) = ctx.services().await else {
            return;
        };

        let mut collected = Vec::new();
        let mut failure = None;
        for service in services.iter_mut() {
            let marked_on_service = is_provisioned(&service.annotations());
            let marked = marked_on_service
                || match service.crd(cluster.as_ref()).await {
                    Ok(crd) => crd.is_some_and(|crd| is_provisioned(&annotations_of(crd))),
                    Err(e) => {
                        failure = Some((reasons::ERROR_READING_CRD, e));
                        break;
                    }
                };
            if !marked {
                continue;
            }

            let Some(secret) = service
                .resource
                .pointer("/status/binding/name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
            else {
                failure = Some((
                    reasons::ERROR_READING_BINDING,
                    BindingError::MissingProvisionedSecret(service.name().to_string()),
                ));
                break;
            };

            let namespace = service.namespace();
            match read_data(cluster.as_ref(), ObjectType::Secret, namespace, secret).await {
                Ok(data) => {
                    let source = source_of(service);
                    collected.extend(items_from(data.into_iter().collect(), &source));
                }
                Err(e) => {
                    failure = Some((reasons::ERROR_READING_SECRET, e));
                    break;
                }
            }
        }

        match failure {
            Some((_, err @ BindingError::InvalidSecretData(_))) => resolution_failed(ctx, err),
            Some((reason, err)) => {
                not_collected(ctx, reason, err.to_string());
                ctx.retry_processing(err);
            }
            None => ctx.items_mut().extend(collected),
        }
    }
}

fn is_provisioned(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(annotations::PROVISIONED_SERVICE)
        .is_some_and(|v| v == "true")
}

/// A service that is a plain Secret without binding annotations is bound as is.
pub struct DirectSecretReference;

#[async_trait]
impl Handler for DirectSecretReference {
    fn name(&self) -> &'static str {
        "collect::DirectSecretReference"
    }

    async fn handle(&self, ctx: &mut Context) {
        let Ok(services) = ctx.services().await else {
            return;
        };

        let mut collected = Vec::new();
        for service in services.iter() {
            if !service.is_secret() || service.annotations().keys().any(|k| is_binding_key(k)) {
                continue;
            }
            let source = source_of(service);
            match data::object_data(&service.resource, ObjectType::Secret) {
                Ok(pairs) => collected.extend(items_from(pairs.into_iter().collect(), &source)),
                Err(e) => {
                    warn!("Secret {} holds undecodable data: {}", service.name(), e);
                    resolution_failed(ctx, e);
                    return;
                }
            }
        }
        ctx.items_mut().extend(collected);
    }
}
