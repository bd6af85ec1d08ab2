// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::reasons;
use kube::runtime::finalizer;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid JSONPath '{expr}': {reason}")]
    InvalidPath { expr: String, reason: String },

    #[error("Invalid fixed JSONPath '{0}'")]
    InvalidFixedPath(String),

    #[error("Path '{0}' not found")]
    PathNotFound(String),

    #[error("Invalid annotation: {0}")]
    InvalidAnnotation(String),

    #[error("Value not found for binding item '{0}'")]
    ValueNotFound(String),

    #[error("Binding data of '{0}' is not a map")]
    DataNotMap(String),

    #[error("Secret data under key '{0}' is not valid base64")]
    InvalidSecretData(String),

    #[error("Failed to read service: {0}")]
    ServiceRead(String),

    #[error("Failed to read application: {0}")]
    ApplicationRead(String),

    #[error("Required binding '{0}' not found")]
    RequiredBindingNotFound(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("No API resource found for {0}")]
    UnknownResource(String),

    #[error("Invalid label selector: {0}")]
    InvalidLabelSelector(String),

    #[error("Invalid workload resource mapping: {0}")]
    InvalidWorkloadMapping(String),

    #[error("Provisioned service {0} does not expose status.binding.name")]
    MissingProvisionedSecret(String),

    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<finalizer::Error<BindingError>>),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),
}

impl BindingError {
    /// True when the API server rejected a write because of a stale resourceVersion.
    pub fn is_conflict(&self) -> bool {
        matches!(self, BindingError::KubeError(kube::Error::Api(err)) if err.code == 409)
    }

    /// True when the API server reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BindingError::KubeError(kube::Error::Api(err)) if err.code == 404)
    }

    /// Condition reason reported on the ServiceBinding for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            BindingError::InvalidAnnotation(_) => reasons::INVALID_ANNOTATION,
            BindingError::ValueNotFound(_) => reasons::VALUE_NOT_FOUND,
            BindingError::DataNotMap(_) => reasons::DATA_NOT_MAP,
            BindingError::InvalidSecretData(_) => reasons::ERROR_READING_SECRET,
            BindingError::RequiredBindingNotFound(_) => reasons::REQUIRED_BINDING_NOT_FOUND,
            BindingError::Template(_) => reasons::NAMING_STRATEGY_ERROR,
            BindingError::ServiceRead(_) => reasons::ERROR_READING_SERVICES,
            BindingError::ApplicationRead(_) => reasons::APPLICATION_NOT_FOUND,
            BindingError::InvalidPath { .. }
            | BindingError::InvalidFixedPath(_)
            | BindingError::InvalidWorkloadMapping(_) => reasons::INVALID_WORKLOAD_MAPPING,
            BindingError::MissingProvisionedSecret(_) | BindingError::PathNotFound(_) => {
                reasons::ERROR_READING_BINDING
            }
            _ => reasons::PROCESSING_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, BindingError>;
