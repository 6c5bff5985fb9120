//! Commands that work on local files, without a cluster.

use std::path::Path;

use anyhow::{Context, Result};
use kiln_core::apis::{ClusterRunTemplate, Pipeline, TemplateOption};
use kiln_core::validation::validate_options;
use kiln_realizer::{templating_context, traceability_labels};
use kiln_templates::{Stamper, Template};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Paths an option selector may address on a workload.
pub const WORKLOAD_PATHS: &[&str] = &[
    "workload.metadata.name",
    "workload.metadata.generateName",
    "workload.metadata.namespace",
    "workload.spec.serviceAccountName",
    "workload.spec.serviceClaims",
    "workload.spec.source",
];

pub const WORKLOAD_PREFIXES: &[&str] = &["workload.metadata.labels", "workload.metadata.annotations", "workload.spec."];

/// YAML is a superset of JSON, so one parser covers both.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Render `template` for `pipeline` exactly as a reconcile would, minus the
/// cluster round trip.
pub fn stamp_preview(pipeline: &Pipeline, template: &ClusterRunTemplate, selected: Option<Value>) -> Result<Value> {
    let ctx = templating_context(pipeline, selected).context("building templating context")?;
    let labels = traceability_labels(&pipeline.name_any(), Template::name(template));
    let stamped = Stamper::new(ctx, labels)
        .with_owner(pipeline.controller_owner_ref(&()), pipeline.namespace())
        .stamp(template.resource_template())
        .context("could not stamp template")?;
    Ok(stamped)
}

/// Validate options against the given allow-list, falling back to the
/// workload defaults when both lists are empty.
pub fn check_options(options: &[TemplateOption], paths: &[String], prefixes: &[String]) -> Result<()> {
    if paths.is_empty() && prefixes.is_empty() {
        validate_options(options, WORKLOAD_PATHS, WORKLOAD_PREFIXES)?;
        return Ok(());
    }
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    let prefixes: Vec<&str> = prefixes.iter().map(String::as_str).collect();
    validate_options(options, &paths, &prefixes)?;
    Ok(())
}
