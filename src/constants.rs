// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Annotation keys understood on backing services and their CRDs
pub mod annotations {
    /// Bare binding annotation key; the output name is derived from the path
    pub const BINDING: &str = "service.binding";
    /// Prefix of named binding annotations (`service.binding/<name>`)
    pub const BINDING_PREFIX: &str = "service.binding/";
    /// Marks a CRD (or a resource) as following the provisioned service convention
    pub const PROVISIONED_SERVICE: &str = "servicebinding.io/provisioned-service";
}

/// The operator name used for server-side apply and as finalizer prefix
pub const OPERATOR_NAME: &str = "binder";

/// Finalizer placed on ServiceBindings so workloads are unbound before deletion
pub const FINALIZER: &str = "binder.operators.coreos.com/unbind";

/// Environment variable carrying the root directory of file bindings
pub const SERVICE_BINDING_ROOT: &str = "SERVICE_BINDING_ROOT";

/// Mount root used when a container does not define SERVICE_BINDING_ROOT
pub const DEFAULT_BINDING_ROOT: &str = "/bindings";

/// Number of hex characters of the content hash used in binding secret names
pub const SECRET_HASH_LEN: usize = 16;

/// Condition types reported on ServiceBinding status
pub mod conditions {
    pub const COLLECTION_READY: &str = "CollectionReady";
    pub const INJECTION_READY: &str = "InjectionReady";
    pub const READY: &str = "Ready";

    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Condition reasons reported on ServiceBinding status
pub mod reasons {
    pub const DATA_COLLECTED: &str = "DataCollected";
    pub const APPLICATIONS_BOUND: &str = "ApplicationsBound";
    pub const EMPTY_APPLICATION: &str = "EmptyApplication";
    pub const APPLICATION_NOT_FOUND: &str = "ApplicationNotFound";
    pub const SERVICE_NOT_FOUND: &str = "ServiceNotFound";
    pub const REQUIRED_BINDING_NOT_FOUND: &str = "RequiredBindingNotFound";
    pub const NAMING_STRATEGY_ERROR: &str = "NamingStrategyError";
    pub const INVALID_ANNOTATION: &str = "InvalidAnnotation";
    pub const ERROR_READING_CRD: &str = "ErrorReadingCRD";
    pub const ERROR_READING_SECRET: &str = "ErrorReadingSecret";
    pub const ERROR_READING_SERVICES: &str = "ErrorReadingServices";
    pub const ERROR_READING_BINDING: &str = "ErrorReadingBinding";
    pub const VALUE_NOT_FOUND: &str = "ValueNotFound";
    pub const DATA_NOT_MAP: &str = "DataNotMap";
    pub const INVALID_WORKLOAD_MAPPING: &str = "InvalidWorkloadMapping";
    pub const PROCESSING_ERROR: &str = "ProcessingError";
}

/// Naming strategy presets accepted in `spec.namingStrategy`
pub mod naming {
    pub const NONE: &str = "{{ .name }}";
    pub const UPPERCASE: &str = "{{ .service.kind | upper }}_{{ .name | upper }}";
    pub const LOWERCASE: &str = "{{ .service.kind | lower }}_{{ .name | lower }}";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
