//! Kiln realizer: turns a [`Pipeline`] into a stamped object, its outputs and
//! a `RunTemplateReady` condition.
//!
//! Stages run strictly in order and stop at the first failure:
//! template lookup, selector resolution, render, create, list, extract.
//! Every stage maps to exactly one condition reason (see [`conditions`]).
//! Nothing is retried here; the controller requeues.

#![forbid(unsafe_code)]

pub mod conditions;
pub mod selector;
mod status;

use std::collections::BTreeMap;
use std::time::Instant;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kiln_core::apis::{
    Outputs, Pipeline, TemplateReference, CLUSTER_RUN_TEMPLATE_KIND, PIPELINE_NAME_LABEL, RUN_TEMPLATE_NAME_LABEL,
};
use kiln_kubehub::{gvk_of, ListQuery, Repository};
use kiln_templates::{Stamper, Template};
use kube::{Resource, ResourceExt};
use metrics::{counter, histogram};
use serde_json::{json, Value};
use tracing::{error, info};

pub use selector::{resolve_selector, SelectorError};
pub use status::reconcile_status;

/// Result of one realize pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizeOutcome {
    pub condition: Condition,
    /// Outputs to publish; `None` when the pass produced none to publish.
    pub outputs: Option<Outputs>,
    /// The stamped object, once creating it has succeeded.
    pub stamped: Option<Value>,
}

impl RealizeOutcome {
    fn failed(condition: Condition) -> Self {
        Self { condition, outputs: None, stamped: None }
    }
}

/// Traceability labels binding stamped objects to their pipeline and template.
pub fn traceability_labels(pipeline_name: &str, template_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PIPELINE_NAME_LABEL.to_string(), pipeline_name.to_string()),
        (RUN_TEMPLATE_NAME_LABEL.to_string(), template_name.to_string()),
    ])
}

/// Context exposed to templates: `pipeline` and `selected`.
pub fn templating_context(pipeline: &Pipeline, selected: Option<Value>) -> serde_json::Result<Value> {
    Ok(json!({
        "pipeline": serde_json::to_value(pipeline)?,
        "selected": selected.unwrap_or(Value::Null),
    }))
}

#[derive(Debug, Clone, Default)]
pub struct Realizer;

impl Realizer {
    pub fn new() -> Self {
        Self
    }

    pub async fn realize(&self, pipeline: &Pipeline, repository: &dyn Repository) -> RealizeOutcome {
        let t0 = Instant::now();
        counter!("realize_attempts", 1u64);
        let outcome = self.realize_inner(pipeline, repository).await;
        histogram!("realize_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("realize_outcome_total", 1u64, "reason" => outcome.condition.reason.clone());
        outcome
    }

    async fn realize_inner(&self, pipeline: &Pipeline, repository: &dyn Repository) -> RealizeOutcome {
        let pipeline_name = pipeline.name_any();
        let namespace = pipeline.namespace();

        // every reference resolves against the single supported template kind
        let reference = TemplateReference {
            kind: CLUSTER_RUN_TEMPLATE_KIND.to_string(),
            ..pipeline.spec.run_template_ref.clone()
        };
        let template = match repository.get_run_template(&reference).await {
            Ok(t) => t,
            Err(e) => {
                let msg = format!("could not get {} '{}'", CLUSTER_RUN_TEMPLATE_KIND, reference.name);
                error!(pipeline = %pipeline_name, error = %format!("{:#}", e), "{}", msg);
                return RealizeOutcome::failed(conditions::template_missing(format!("{}: {:#}", msg, e)));
            }
        };
        let template_name = Template::name(&template).to_string();
        let labels = traceability_labels(&pipeline_name, &template_name);

        let selected = match resolve_selector(pipeline.spec.selector.as_ref(), repository).await {
            Ok(s) => s,
            Err(e) => {
                let msg = match &pipeline.spec.selector {
                    Some(sel) => format!(
                        "could not resolve selector (apiVersion:{} kind:{} labels:{:?})",
                        sel.resource.api_version, sel.resource.kind, sel.matching_labels
                    ),
                    None => "could not resolve selector".to_string(),
                };
                error!(pipeline = %pipeline_name, error = %e, "{}", msg);
                return RealizeOutcome::failed(conditions::template_stamp_failure(format!("{}: {}", msg, e)));
            }
        };

        let stamped = templating_context(pipeline, selected)
            .map_err(|e| e.to_string())
            .and_then(|ctx| {
                Stamper::new(ctx, labels.clone())
                    .with_owner(pipeline.controller_owner_ref(&()), namespace.clone())
                    .stamp(template.resource_template())
                    .map_err(|e| e.to_string())
            });
        let stamped = match stamped {
            Ok(obj) => obj,
            Err(e) => {
                error!(pipeline = %pipeline_name, template = %template_name, error = %e, "could not stamp template");
                return RealizeOutcome::failed(conditions::template_stamp_failure(format!(
                    "could not stamp template: {}",
                    e
                )));
            }
        };

        if let Err(e) = repository.ensure_object_exists_on_cluster(&stamped, false).await {
            error!(pipeline = %pipeline_name, error = %format!("{:#}", e), "could not create object");
            return RealizeOutcome::failed(conditions::stamp_rejected(format!("could not create object: {:#}", e)));
        }

        let listed = match gvk_of(&stamped) {
            Ok(gvk) => {
                let query = ListQuery::new(gvk)
                    .namespace(kiln_core::value::meta_str(&stamped, "namespace"))
                    .labels(labels);
                repository.list_unstructured(&query).await
            }
            Err(e) => Err(e),
        };
        let all_stamped = match listed {
            Ok(objs) => objs,
            Err(e) => {
                let msg = format!("could not list pipeline objects: {:#}", e);
                info!(pipeline = %pipeline_name, "{}", msg);
                return RealizeOutcome { condition: conditions::list_failed(msg), outputs: None, stamped: Some(stamped) };
            }
        };

        let outputs = match template.outputs(&all_stamped) {
            Ok(o) => o,
            Err(e) => {
                info!(pipeline = %pipeline_name, "could not get output: {}", e);
                return RealizeOutcome {
                    condition: conditions::output_extraction_failed(&e),
                    outputs: None,
                    stamped: Some(stamped),
                };
            }
        };
        let outputs = if outputs.is_empty() {
            pipeline.status.as_ref().map(|s| s.outputs.clone()).unwrap_or_default()
        } else {
            outputs
        };

        RealizeOutcome { condition: conditions::run_template_ready(), outputs: Some(outputs), stamped: Some(stamped) }
    }
}
