// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::binding::BindingItem;
use crate::constants::{conditions, reasons};
use crate::error::BindingError;
use crate::pipeline::{Context, Handler};
use crate::template::TemplateEngine;
use crate::types::Condition;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Add the binding's custom mappings. Each value is a template over the
/// collected items and the services keyed by their `id`.
pub struct Mapping;

#[async_trait]
impl Handler for Mapping {
    fn name(&self) -> &'static str {
        "mapping::Mapping"
    }

    async fn handle(&self, ctx: &mut Context) {
        let mappings = ctx.binding().spec.mappings.clone();
        if mappings.is_empty() {
            return;
        }

        let mut scope: Map<String, Value> = ctx
            .items()
            .as_map()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        if let Ok(services) = ctx.services().await {
            for service in services.iter() {
                if let Some(id) = &service.id {
                    scope.insert(id.clone(), service.resource.clone());
                }
            }
        }
        let scope = Value::Object(scope);

        let engine = TemplateEngine::new();
        let mut added = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            match engine.render(&mapping.value, &scope) {
                Ok(value) => {
                    debug!("Mapped {}", mapping.name);
                    added.push(BindingItem::new(mapping.name.clone(), value, None));
                }
                Err(e) => {
                    warn!("Mapping {} failed: {}", mapping.name, e);
                    ctx.set_condition(Condition::new(
                        conditions::COLLECTION_READY,
                        false,
                        reasons::PROCESSING_ERROR,
                        format!("mapping {}: {}", mapping.name, e),
                    ));
                    ctx.stop_processing();
                    ctx.error(BindingError::Template(e));
                    return;
                }
            }
        }
        ctx.items_mut().extend(added);
    }
}
