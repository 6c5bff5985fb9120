//! Kiln core types: pipeline APIs, attribute trees and option validation.

#![forbid(unsafe_code)]

pub mod apis;
pub mod validation;
pub mod value;

pub mod prelude {
    pub use super::apis::{
        ClusterRunTemplate, ClusterRunTemplateSpec, NamespacedName, Outputs, Pipeline, PipelineSpec,
        PipelineStatus, ResourceSelector, ResourceType, TemplateReference,
    };
    pub use super::validation::{validate_options, validate_requirements, ValidationError};
    pub use super::value::{canonical_eq, lookup};
}

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

/// Canonical condition status literals.
pub mod status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Split an `apiVersion` into `(group, version)`; core kinds have an empty group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    }
}
