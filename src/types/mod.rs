// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources owned or read by the operator.

pub mod service_binding;
pub mod workload_mapping;

pub use service_binding::{
    ApplicationRef, BindingPath, BoundApplication, Condition, EnvMapping, Mapping,
    ServiceBinding, ServiceBindingSpec, ServiceBindingStatus, ServiceRef,
};
pub use workload_mapping::{
    ClusterWorkloadResourceMapping, ClusterWorkloadResourceMappingContainer,
    ClusterWorkloadResourceMappingSpec, ClusterWorkloadResourceMappingTemplate, FieldError,
    FieldErrorKind,
};
