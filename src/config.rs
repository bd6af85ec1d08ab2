// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch for ServiceBindings, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Upper bound of bindings reconciled in parallel
    pub max_concurrent_reconciles: u16,
    /// Delay before reprocessing bindings that target label-selected workloads
    pub requeue_delay: Duration,
    /// Backoff applied by the error policy
    pub error_requeue: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            watch_namespace: None,
            max_concurrent_reconciles: 1,
            requeue_delay: Duration::from_secs(30),
            error_requeue: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let watch_namespace = env::var("WATCH_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty());

        let max_concurrent_reconciles = match env::var("MAX_CONCURRENT_RECONCILES") {
            Ok(v) => v
                .parse()
                .context("MAX_CONCURRENT_RECONCILES must be a positive integer")?,
            Err(_) => defaults.max_concurrent_reconciles,
        };

        let requeue_delay = match env::var("REQUEUE_DELAY_SECS") {
            Ok(v) => Duration::from_secs(
                v.parse()
                    .context("REQUEUE_DELAY_SECS must be a number of seconds")?,
            ),
            Err(_) => defaults.requeue_delay,
        };

        let error_requeue = match env::var("ERROR_REQUEUE_SECS") {
            Ok(v) => Duration::from_secs(
                v.parse()
                    .context("ERROR_REQUEUE_SECS must be a number of seconds")?,
            ),
            Err(_) => defaults.error_requeue,
        };

        Ok(Config {
            watch_namespace,
            max_concurrent_reconciles,
            requeue_delay,
            error_requeue,
        })
    }
}
