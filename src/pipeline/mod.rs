// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ordered handlers over a per-reconciliation [`Context`].

pub mod application;
pub mod context;
pub mod service;

pub use application::Application;
pub use context::{Context, Mode};
pub use service::{OwnedResource, Service};

use crate::error::BindingError;
use crate::handlers::{collect, mapping, naming, project};
use crate::kubernetes::ClusterAccess;
use crate::types::ServiceBinding;
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// One step of the pipeline. Handlers report through the context's flow
/// methods rather than return values.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut Context);
}

/// Result of one pipeline run.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Reconcile again, the run failed on something that may converge
    pub retry: bool,
    /// Reconcile again later, the run itself succeeded
    pub delay: bool,
    pub error: Option<BindingError>,
}

pub struct Pipeline {
    mode: Mode,
    handlers: Vec<Box<dyn Handler>>,
}

impl Pipeline {
    pub fn new(mode: Mode, handlers: Vec<Box<dyn Handler>>) -> Self {
        Pipeline { mode, handlers }
    }

    /// Collect, transform and inject the binding.
    pub fn bind() -> Self {
        Pipeline::new(
            Mode::Bind,
            vec![
                Box::new(collect::PreFlight),
                Box::new(collect::BindingDefinitions),
                Box::new(collect::BindingItems),
                Box::new(collect::OwnedResources),
                Box::new(collect::ProvisionedService),
                Box::new(collect::DirectSecretReference),
                Box::new(mapping::Mapping),
                Box::new(naming::Naming),
                Box::new(project::PreFlightCheck::default()),
                Box::new(project::InjectSecretRef),
                Box::new(project::BindingsAsEnv),
                Box::new(project::BindingsAsFiles),
                Box::new(project::PostFlightCheck),
            ],
        )
    }

    /// Remove the binding from its applications.
    pub fn unbind() -> Self {
        Pipeline::new(Mode::Unbind, vec![Box::new(project::Unbind)])
    }

    #[instrument(
        skip(self, binding, cluster),
        fields(binding = %binding.name_any(), mode = ?self.mode)
    )]
    pub async fn process(
        &self,
        binding: ServiceBinding,
        cluster: Arc<dyn ClusterAccess>,
    ) -> Outcome {
        let mut ctx = Context::new(binding, cluster, self.mode);

        for handler in &self.handlers {
            debug!("Running handler {}", handler.name());
            handler.handle(&mut ctx).await;
            if ctx.is_stopped() {
                debug!("Processing stopped by {}", handler.name());
                break;
            }
        }

        let closed = ctx.close().await;
        if let Err(e) = &closed {
            warn!("Failed to persist binding: {}", e);
        }
        ctx.into_outcome(closed)
    }
}
