//! Kiln run templates: the [`Template`] seam, the [`Stamper`] and output
//! extraction for [`ClusterRunTemplate`].

#![forbid(unsafe_code)]

pub mod stamper;

use chrono::{DateTime, Utc};
use kiln_core::apis::{ClusterRunTemplate, Outputs};
use kiln_core::status;
use kiln_core::value::lookup;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use stamper::{StampError, Stamper};

/// Condition type a stamped object reports once its work has finished.
pub const SUCCEEDED_CONDITION: &str = "Succeeded";

#[derive(Debug, Error, PartialEq)]
pub enum OutputError {
    #[error("output [{output}]: path [{path}] not found in object [{object}]")]
    PathNotSatisfied { output: String, path: String, object: String },
}

/// What the realizer needs from a run template.
pub trait Template: Send + Sync {
    fn name(&self) -> &str;

    /// Raw object to stamp.
    fn resource_template(&self) -> &Value;

    /// Evaluate output paths over every object stamped for a pipeline so far.
    /// An empty map means nothing is ready yet.
    fn outputs(&self, stamped: &[Value]) -> Result<Outputs, OutputError>;
}

impl Template for ClusterRunTemplate {
    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn resource_template(&self) -> &Value {
        &self.spec.template
    }

    fn outputs(&self, stamped: &[Value]) -> Result<Outputs, OutputError> {
        let mut outputs = Outputs::new();
        if self.spec.outputs.is_empty() {
            return Ok(outputs);
        }
        let Some(latest) = latest_succeeded(stamped) else {
            debug!(template = %Template::name(self), candidates = stamped.len(), "no succeeded object yet");
            return Ok(outputs);
        };
        for (output, path) in &self.spec.outputs {
            let v = lookup(latest, path).ok_or_else(|| OutputError::PathNotSatisfied {
                output: output.clone(),
                path: path.clone(),
                object: kiln_core::value::meta_str(latest, "name").unwrap_or_default().to_string(),
            })?;
            outputs.insert(output.clone(), v.clone());
        }
        Ok(outputs)
    }
}

fn succeeded(obj: &Value) -> bool {
    obj.get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
        .map(|conds| {
            conds.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(SUCCEEDED_CONDITION)
                    && c.get("status").and_then(Value::as_str) == Some(status::TRUE)
            })
        })
        .unwrap_or(false)
}

fn created_at(obj: &Value) -> Option<DateTime<Utc>> {
    kiln_core::value::meta_str(obj, "creationTimestamp")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Most recently created object whose `Succeeded` condition is `True`.
/// Objects without a parseable creation time sort first.
pub fn latest_succeeded(objects: &[Value]) -> Option<&Value> {
    objects.iter().filter(|o| succeeded(o)).max_by_key(|o| created_at(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::apis::ClusterRunTemplateSpec;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn template(outputs: &[(&str, &str)]) -> ClusterRunTemplate {
        ClusterRunTemplate::new(
            "tekton-build",
            ClusterRunTemplateSpec {
                template: json!({ "apiVersion": "tekton.dev/v1beta1", "kind": "TaskRun" }),
                outputs: outputs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
            },
        )
    }

    fn run(name: &str, created: &str, succeeded: &str, image: &str) -> Value {
        json!({
            "metadata": { "name": name, "creationTimestamp": created },
            "status": {
                "conditions": [{ "type": "Succeeded", "status": succeeded }],
                "results": [{ "name": "image", "value": image }]
            }
        })
    }

    #[test]
    fn picks_most_recent_succeeded_object() {
        let t = template(&[("image", "status.results[0].value")]);
        let objs = vec![
            run("a", "2024-01-01T00:00:00Z", "True", "app:v1"),
            run("c", "2024-01-03T00:00:00Z", "False", "app:v3"),
            run("b", "2024-01-02T00:00:00Z", "True", "app:v2"),
        ];
        let out = t.outputs(&objs).unwrap();
        assert_eq!(out.get("image"), Some(&json!("app:v2")));
    }

    #[test]
    fn nothing_succeeded_yields_empty_outputs() {
        let t = template(&[("image", "status.results[0].value")]);
        let objs = vec![run("a", "2024-01-01T00:00:00Z", "Unknown", "app:v1")];
        assert!(t.outputs(&objs).unwrap().is_empty());
        assert!(t.outputs(&[]).unwrap().is_empty());
    }

    #[test]
    fn unsatisfied_path_is_an_error() {
        let t = template(&[("digest", "status.digest")]);
        let objs = vec![run("a", "2024-01-01T00:00:00Z", "True", "app:v1")];
        let err = t.outputs(&objs).unwrap_err();
        assert_eq!(
            err,
            OutputError::PathNotSatisfied { output: "digest".into(), path: "status.digest".into(), object: "a".into() }
        );
    }

    #[test]
    fn exposes_name_and_raw_template() {
        let t = template(&[]);
        assert_eq!(Template::name(&t), "tekton-build");
        assert_eq!(t.resource_template()["kind"], "TaskRun");
    }
}
