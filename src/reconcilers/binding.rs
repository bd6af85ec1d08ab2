// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ServiceBinding reconciler - binds on apply, unbinds behind a finalizer
//! on deletion.

use crate::config::Config;
use crate::constants::FINALIZER;
use crate::error::{BindingError, Result};
use crate::kubernetes::{ClusterAccess, KubeAccessor};
use crate::pipeline::{Outcome, Pipeline};
use crate::types::ServiceBinding;
use futures::StreamExt;
use kube::{
    runtime::{
        controller::{self, Action},
        finalizer::{finalizer, Event},
        Controller,
    },
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue after a failure that did not produce an error, such as a
/// conflicting write.
const RETRY_AFTER: Duration = Duration::from_secs(5);

pub struct BindingReconciler {
    client: Client,
    cluster: Arc<dyn ClusterAccess>,
    config: Config,
    bind: Pipeline,
    unbind: Pipeline,
}

impl BindingReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        Self {
            cluster: Arc::new(KubeAccessor::new(client.clone())),
            client,
            config,
            bind: Pipeline::bind(),
            unbind: Pipeline::unbind(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let bindings: Api<ServiceBinding> = match &self.config.watch_namespace {
            Some(ns) => {
                info!("Watching ServiceBindings in namespace {}", ns);
                Api::namespaced(self.client.clone(), ns)
            }
            None => Api::all(self.client.clone()),
        };
        let controller_config =
            controller::Config::default().concurrency(self.config.max_concurrent_reconciles);
        let context = Arc::new(self);

        Controller::new(bindings, WatcherConfig::default())
            .with_config(controller_config)
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled binding: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    async fn process(&self, pipeline: &Pipeline, binding: Arc<ServiceBinding>) -> Result<Action> {
        let outcome = pipeline
            .process((*binding).clone(), self.cluster.clone())
            .await;
        action_for(outcome, &self.config)
    }
}

async fn reconcile(binding: Arc<ServiceBinding>, ctx: Arc<BindingReconciler>) -> Result<Action> {
    let namespace = binding
        .namespace()
        .ok_or(BindingError::MissingObjectKey(".metadata.namespace"))?;
    debug!("Reconciling binding: {}/{}", namespace, binding.name_any());

    let api: Api<ServiceBinding> = Api::namespaced(ctx.client.clone(), &namespace);
    finalizer(&api, FINALIZER, binding, |event| async {
        match event {
            Event::Apply(binding) => ctx.process(&ctx.bind, binding).await,
            Event::Cleanup(binding) => {
                info!("Unbinding {}/{}", namespace, binding.name_any());
                ctx.process(&ctx.unbind, binding).await
            }
        }
    })
    .await
    .map_err(|e| BindingError::Finalizer(Box::new(e)))
}

/// Translate a pipeline outcome into the next controller action. Errors
/// that warrant a retry are returned so the error policy backs off.
fn action_for(outcome: Outcome, config: &Config) -> Result<Action> {
    match outcome {
        Outcome {
            retry: true,
            error: Some(e),
            ..
        } => Err(e),
        Outcome { retry: true, .. } => Ok(Action::requeue(RETRY_AFTER)),
        Outcome { delay: true, error, .. } => {
            if let Some(e) = error {
                warn!("Binding processed with error: {}", e);
            }
            Ok(Action::requeue(config.requeue_delay))
        }
        Outcome { error: Some(e), .. } => {
            warn!("Binding not processed: {}", e);
            Ok(Action::await_change())
        }
        Outcome { .. } => Ok(Action::await_change()),
    }
}

fn error_policy(
    binding: Arc<ServiceBinding>,
    error: &BindingError,
    ctx: Arc<BindingReconciler>,
) -> Action {
    // Someone else wrote first, start over with fresh objects
    if error.is_conflict() {
        debug!("Conflict while writing for {}, retrying: {}", binding.name_any(), error);
        return Action::requeue(RETRY_AFTER);
    }
    error!("Reconciliation error: {}", error);
    Action::requeue(ctx.config.error_requeue)
}
