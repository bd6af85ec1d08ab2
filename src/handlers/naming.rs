// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{conditions, reasons};
use crate::pipeline::{Context, Handler};
use crate::template::TemplateEngine;
use crate::types::Condition;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

/// Rename collected items through the binding's naming strategy. Items that
/// did not come from a service keep their name.
pub struct Naming;

#[async_trait]
impl Handler for Naming {
    fn name(&self) -> &'static str {
        "naming::Naming"
    }

    async fn handle(&self, ctx: &mut Context) {
        let strategy = ctx.binding().naming_template();
        let engine = TemplateEngine::new();

        let rendered: Result<Vec<String>, _> = ctx
            .items()
            .iter()
            .map(|item| match &item.source {
                None => Ok(item.name.clone()),
                Some(source) => engine.render(
                    &strategy,
                    json!({
                        "name": item.name,
                        "service": {"kind": source.kind, "name": source.name},
                    }),
                ),
            })
            .collect();

        let names = match rendered {
            Ok(names) => names,
            Err(e) => {
                warn!("Naming strategy '{}' failed: {}", strategy, e);
                ctx.set_condition(Condition::new(
                    conditions::COLLECTION_READY,
                    false,
                    reasons::NAMING_STRATEGY_ERROR,
                    e.to_string(),
                ));
                ctx.stop_processing();
                return;
            }
        };

        for (item, name) in ctx.items_mut().iter_mut().zip(names) {
            if item.name != name {
                debug!("Renaming {} to {}", item.name, name);
                item.name = name;
            }
        }
    }
}
