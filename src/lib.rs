// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod binding;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod jsonpath;
pub mod kubernetes;
pub mod pipeline;
pub mod reconcilers;
pub mod template;
pub mod types;
pub mod workload;

#[cfg(test)]
mod test_utils;
