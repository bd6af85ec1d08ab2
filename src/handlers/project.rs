// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Handlers projecting the binding secret into the applications, and
//! removing it again on unbind.

use crate::constants::{conditions, reasons, DEFAULT_BINDING_ROOT, SERVICE_BINDING_ROOT};
use crate::error::{BindingError, Result};
use crate::jsonpath::JsonPath;
use crate::pipeline::{Application, Context, Handler};
use crate::types::{Condition, EnvMapping};
use crate::workload::{list_mut, prune_empty_list, ContainerMapping};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

fn not_injected(ctx: &mut Context, reason: &str, message: impl Into<String>) {
    ctx.set_condition(Condition::new(conditions::INJECTION_READY, false, reason, message));
}

/// Applications whose containers receive the binding, i.e. those without a
/// custom secret path.
fn container_targets(apps: &mut [Application]) -> impl Iterator<Item = &mut Application> + '_ {
    apps.iter_mut().filter(|a| a.secret_path().is_none())
}

fn secret_ref_name(entry: &Value) -> Option<&str> {
    entry.pointer("/secretRef/name").and_then(Value::as_str)
}

fn secret_key_ref_name(entry: &Value) -> Option<&str> {
    entry
        .pointer("/valueFrom/secretKeyRef/name")
        .and_then(Value::as_str)
}

fn named<'a>(list: &'a mut [Value], name: &str) -> Option<&'a mut Value> {
    list.iter_mut()
        .find(|v| v.get("name").and_then(Value::as_str) == Some(name))
}

/// Apply a per-application injection to every selected container. Fails when
/// the mapping selects no container at all.
fn inject<F>(app: &mut Application, mut f: F) -> Result<()>
where
    F: FnMut(&ContainerMapping, &mut Value) -> Result<()>,
{
    let count = app.mapping.for_each_container(&mut app.resource, &mut f)?;
    if count == 0 {
        return Err(BindingError::InvalidWorkloadMapping(format!(
            "no containers found in {} {}",
            app.api_resource.kind,
            app.name()
        )));
    }
    Ok(())
}

fn injection_failed(ctx: &mut Context, err: BindingError) {
    warn!("Injection into applications failed: {}", err);
    not_injected(ctx, err.reason(), err.to_string());
    ctx.stop_processing();
}

/// Gate between collection and injection: required keys are present and the
/// applications can be read.
#[derive(Default)]
pub struct PreFlightCheck {
    pub required_keys: Vec<String>,
}

#[async_trait]
impl Handler for PreFlightCheck {
    fn name(&self) -> &'static str {
        "project::PreFlightCheck"
    }

    async fn handle(&self, ctx: &mut Context) {
        let env_keys = ctx.binding().spec.env.iter().map(|e| e.key.clone());
        let missing: Vec<String> = self
            .required_keys
            .iter()
            .cloned()
            .chain(env_keys)
            .filter(|k| !ctx.items().contains(k))
            .collect();
        if !missing.is_empty() {
            let err = BindingError::RequiredBindingNotFound(missing.join(", "));
            ctx.set_condition(Condition::new(
                conditions::COLLECTION_READY,
                false,
                reasons::REQUIRED_BINDING_NOT_FOUND,
                err.to_string(),
            ));
            ctx.stop_processing();
            return;
        }
        ctx.set_condition(Condition::new(
            conditions::COLLECTION_READY,
            true,
            reasons::DATA_COLLECTED,
            "",
        ));

        match ctx.applications().await {
            Ok(apps) if apps.is_empty() => {
                not_injected(ctx, reasons::EMPTY_APPLICATION, "no application matches the binding");
                ctx.stop_processing();
            }
            Ok(_) => {}
            Err(e @ BindingError::KubeError(_)) | Err(e @ BindingError::ApplicationRead(_)) => {
                not_injected(ctx, reasons::APPLICATION_NOT_FOUND, e.to_string());
                ctx.retry_processing(e);
            }
            Err(e) => injection_failed(ctx, e),
        }
    }
}

/// Write the secret name into `bindingPath.secretPath` of the applications
/// that declare one.
pub struct InjectSecretRef;

#[async_trait]
impl Handler for InjectSecretRef {
    fn name(&self) -> &'static str {
        "project::InjectSecretRef"
    }

    async fn handle(&self, ctx: &mut Context) {
        let secret = ctx.binding_secret_name();
        let Ok(apps) = ctx.applications().await else {
            return;
        };

        let mut failure = None;
        for app in apps.iter_mut() {
            let Some(path) = app.secret_path().map(str::to_string) else {
                continue;
            };
            let result = JsonPath::parse_fixed(&path).and_then(|p| {
                *p.get_or_insert_with(&mut app.resource, || Value::Null)? =
                    Value::String(secret.clone());
                Ok(())
            });
            if let Err(e) = result {
                failure = Some(e);
                break;
            }
        }
        if let Some(err) = failure {
            injection_failed(ctx, err);
        }
    }
}

/// Expose the binding secret as environment variables.
pub struct BindingsAsEnv;

#[async_trait]
impl Handler for BindingsAsEnv {
    fn name(&self) -> &'static str {
        "project::BindingsAsEnv"
    }

    async fn handle(&self, ctx: &mut Context) {
        let secret = ctx.binding_secret_name();
        let previous = ctx.binding().secret_name().map(str::to_string);
        let as_env = !ctx.binding().spec.bind_as_files;
        let env = ctx.binding().spec.env.clone();
        if !as_env && env.is_empty() {
            return;
        }
        let Ok(apps) = ctx.applications().await else {
            return;
        };

        let mut failure = None;
        for app in container_targets(apps) {
            let result = inject(app, |mapping, container| {
                if as_env {
                    let env_from = list_mut(&mapping.env_from, container)?;
                    if let Some(old) = previous.as_deref().filter(|old| *old != secret) {
                        env_from.retain(|e| secret_ref_name(e) != Some(old));
                    }
                    if !env_from.iter().any(|e| secret_ref_name(e) == Some(secret.as_str())) {
                        env_from.push(json!({"secretRef": {"name": secret}}));
                    }
                }
                if !env.is_empty() {
                    let list = list_mut(&mapping.env, container)?;
                    add_env_vars(list, &env, &secret, previous.as_deref());
                }
                Ok(())
            });
            if let Err(e) = result {
                failure = Some(e);
                break;
            }
        }
        if let Some(err) = failure {
            injection_failed(ctx, err);
        }
    }
}

/// Add one `secretKeyRef` variable per mapping. A variable that already
/// exists is only repointed when it referenced the previous binding secret.
fn add_env_vars(list: &mut Vec<Value>, env: &[EnvMapping], secret: &str, previous: Option<&str>) {
    for mapping in env {
        let wanted = json!({
            "name": mapping.name,
            "valueFrom": {"secretKeyRef": {"name": secret, "key": mapping.key}},
        });
        match named(list, &mapping.name) {
            Some(existing) => {
                if previous.is_some() && secret_key_ref_name(existing) == previous {
                    *existing = wanted;
                }
            }
            None => list.push(wanted),
        }
    }
}

/// Mount the binding secret as files below `$SERVICE_BINDING_ROOT/<binding>`,
/// or at the binding's explicit mount path.
pub struct BindingsAsFiles;

#[async_trait]
impl Handler for BindingsAsFiles {
    fn name(&self) -> &'static str {
        "project::BindingsAsFiles"
    }

    async fn handle(&self, ctx: &mut Context) {
        if !ctx.binding().spec.bind_as_files {
            return;
        }
        let secret = ctx.binding_secret_name();
        let volume = ctx.binding_name();
        let mount_path = ctx.binding().spec.mount_path.clone().filter(|p| !p.is_empty());
        let Ok(apps) = ctx.applications().await else {
            return;
        };

        let mut failure = None;
        for app in container_targets(apps) {
            let result = mount_volume(app, &volume, &secret).and_then(|_| {
                inject(app, |mapping, container| {
                    let path = match &mount_path {
                        Some(path) => path.clone(),
                        None => {
                            let root = binding_root(list_mut(&mapping.env, container)?);
                            format!("{}/{}", root, volume)
                        }
                    };
                    let mounts = list_mut(&mapping.volume_mounts, container)?;
                    match named(mounts, &volume) {
                        Some(existing) if existing.get("mountPath") == Some(&json!(path)) => {}
                        Some(existing) => existing["mountPath"] = json!(path),
                        None => mounts.push(json!({"name": volume, "mountPath": path})),
                    }
                    Ok(())
                })
            });
            if let Err(e) = result {
                failure = Some(e);
                break;
            }
        }
        if let Some(err) = failure {
            injection_failed(ctx, err);
        }
    }
}

/// Volume named after the binding pointing at the binding secret, corrected
/// in place when it points elsewhere.
fn mount_volume(app: &mut Application, volume: &str, secret: &str) -> Result<()> {
    let volumes = list_mut(&app.mapping.volumes, &mut app.resource)?;
    match named(volumes, volume) {
        Some(existing) if existing.pointer("/secret/secretName") == Some(&json!(secret)) => {}
        Some(existing) => {
            debug!("Repointing volume {} to secret {}", volume, secret);
            existing["secret"] = json!({"secretName": secret});
        }
        None => volumes.push(json!({"name": volume, "secret": {"secretName": secret}})),
    }
    Ok(())
}

/// Value of `SERVICE_BINDING_ROOT` in the container env, set to the default
/// when the container does not define it. A root taken from `valueFrom`
/// cannot be read here, so it is left alone and the default is used.
fn binding_root(env: &mut Vec<Value>) -> String {
    match named(env, SERVICE_BINDING_ROOT) {
        Some(existing) => match existing.get("value").and_then(Value::as_str) {
            Some(root) => root.to_string(),
            None => {
                warn!(
                    "{} is not a literal value, mounting below {}",
                    SERVICE_BINDING_ROOT, DEFAULT_BINDING_ROOT
                );
                DEFAULT_BINDING_ROOT.to_string()
            }
        },
        None => {
            env.push(json!({"name": SERVICE_BINDING_ROOT, "value": DEFAULT_BINDING_ROOT}));
            DEFAULT_BINDING_ROOT.to_string()
        }
    }
}

/// Remove everything the bind handlers added from the applications.
pub struct Unbind;

#[async_trait]
impl Handler for Unbind {
    fn name(&self) -> &'static str {
        "project::Unbind"
    }

    async fn handle(&self, ctx: &mut Context) {
        let secret = ctx.binding().secret_name().map(str::to_string);
        let volume = ctx.binding_name();
        let apps = match ctx.applications().await {
            Ok(apps) if !apps.is_empty() => apps,
            Ok(_) => {
                ctx.stop_processing();
                return;
            }
            Err(e) => {
                debug!("Nothing to unbind, applications not readable: {}", e);
                ctx.stop_processing();
                return;
            }
        };

        for app in apps.iter_mut() {
            if let Some(path) = app.secret_path().and_then(|p| JsonPath::parse_fixed(p).ok()) {
                let current = path
                    .get_mut(&mut app.resource)
                    .and_then(|v| v.as_str().map(str::to_string));
                if current.is_some() && current == secret {
                    path.remove(&mut app.resource);
                }
                continue;
            }

            let removed = app.mapping.for_each_container(&mut app.resource, |mapping, container| {
                if let Some(secret) = secret.as_deref() {
                    remove_where(&mapping.env_from, container, |e| {
                        secret_ref_name(e) == Some(secret)
                    });
                    remove_where(&mapping.env, container, |e| {
                        secret_key_ref_name(e) == Some(secret)
                    });
                }
                remove_where(&mapping.volume_mounts, container, |m| {
                    m.get("name").and_then(Value::as_str) == Some(volume.as_str())
                });
                Ok(())
            });
            if let Err(e) = removed {
                warn!("Unable to unbind {}: {}", app.name(), e);
            }
            remove_where(&app.mapping.volumes, &mut app.resource, |v| {
                v.get("name").and_then(Value::as_str) == Some(volume.as_str())
            });
            if app.is_updated() {
                info!("Unbinding {} {}", app.api_resource.kind, app.name());
            }
        }
    }
}

/// Remove matching entries from the list at `path`, dropping the list when
/// it ends up empty.
fn remove_where<F>(path: &JsonPath, node: &mut Value, matches: F)
where
    F: Fn(&Value) -> bool,
{
    let changed = match path.get_mut(node).and_then(Value::as_array_mut) {
        Some(list) => {
            let before = list.len();
            list.retain(|entry| !matches(entry));
            list.len() != before
        }
        None => false,
    };
    if changed {
        prune_empty_list(path, node);
    }
}

/// Mark injection as done. Label selected applications can change without
/// the binding changing, so they are looked at again later.
pub struct PostFlightCheck;

#[async_trait]
impl Handler for PostFlightCheck {
    fn name(&self) -> &'static str {
        "project::PostFlightCheck"
    }

    async fn handle(&self, ctx: &mut Context) {
        ctx.set_condition(Condition::new(
            conditions::INJECTION_READY,
            true,
            reasons::APPLICATIONS_BOUND,
            "",
        ));
        let by_label = ctx
            .applications()
            .await
            .map(|apps| apps.iter().any(|a| a.selected_by_label))
            .unwrap_or(false);
        if by_label {
            ctx.delay_reprocessing(None);
        }
    }
}
