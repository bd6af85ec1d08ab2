// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for resource access, discovery and CRD availability.

pub mod accessor;
pub mod crd;
pub mod resources;

pub use accessor::{ClusterAccess, KubeAccessor, ResourceRef};
pub use crd::wait_for_binding_crd;
