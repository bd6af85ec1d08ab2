// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use binder::config::Config;
use binder::kubernetes::{wait_for_binding_crd, KubeAccessor};
use binder::reconcilers::BindingReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting binder operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: watch_namespace={}, max_concurrent_reconciles={}",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.max_concurrent_reconciles
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for ServiceBinding CRD to become available...");
    wait_for_binding_crd(&KubeAccessor::new(client.clone())).await?;

    BindingReconciler::new(client, config).run().await?;

    // The controller only returns once its watch stream ends
    warn!("Binding reconciler stopped unexpectedly");
    Ok(())
}
