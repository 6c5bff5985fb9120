//! Custom resources and shared API vocabulary (`carto.run/v1alpha1`).

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GROUP: &str = "carto.run";
pub const VERSION: &str = "v1alpha1";

/// Label applied to stamped objects naming the owning pipeline.
pub const PIPELINE_NAME_LABEL: &str = "carto.run/pipeline-name";
/// Label applied to stamped objects naming the run template they came from.
pub const RUN_TEMPLATE_NAME_LABEL: &str = "carto.run/run-template-name";

/// Kind every run template reference resolves against.
pub const CLUSTER_RUN_TEMPLATE_KIND: &str = "ClusterRunTemplate";

/// Top-level condition type published on a pipeline.
pub const PIPELINE_READY: &str = "Ready";
/// Sub-condition reporting the outcome of stamping the run template.
pub const RUN_TEMPLATE_READY: &str = "RunTemplateReady";

/// Outputs extracted from stamped objects, keyed by output name.
pub type Outputs = BTreeMap<String, Value>;

/// A pipeline binds a run template to an optional selected object and
/// stamps it on every reconcile.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "carto.run",
    version = "v1alpha1",
    kind = "Pipeline",
    namespaced,
    status = "PipelineStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub run_template_ref: TemplateReference,

    /// Selects a single object whose content is exposed to the template as
    /// `selected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ResourceSelector>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub outputs: Outputs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateReference {
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub api_version: String,
    pub kind: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub resource: ResourceType,
    #[serde(default)]
    pub matching_labels: BTreeMap<String, String>,
}

/// Cluster-scoped template stamped once per pipeline reconcile.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterRunTemplate")]
#[serde(rename_all = "camelCase")]
pub struct ClusterRunTemplateSpec {
    /// Object to stamp. Strings may reference `$(pipeline.<path>)$` and
    /// `$(selected.<path>)$`.
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub template: Value,

    /// Output name to path, evaluated against the most recent succeeded
    /// stamped object.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, Schema, SchemaObject};
    let mut obj = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    obj.extensions
        .insert("x-kubernetes-preserve-unknown-fields".into(), Value::Bool(true));
    Schema::Object(obj)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

// ---- template options ----

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldSelectorOperator {
    Exists,
    DoesNotExist,
    In,
    NotIn,
    /// Any other operator string, kept so validation can report it.
    Unrecognized(String),
}

impl From<String> for FieldSelectorOperator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Exists" => Self::Exists,
            "DoesNotExist" => Self::DoesNotExist,
            "In" => Self::In,
            "NotIn" => Self::NotIn,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<FieldSelectorOperator> for String {
    fn from(op: FieldSelectorOperator) -> Self {
        op.to_string()
    }
}

impl fmt::Display for FieldSelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => write!(f, "Exists"),
            Self::DoesNotExist => write!(f, "DoesNotExist"),
            Self::In => write!(f, "In"),
            Self::NotIn => write!(f, "NotIn"),
            Self::Unrecognized(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelectorRequirement {
    pub key: String,
    pub operator: FieldSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSelector {
    #[serde(default)]
    pub match_fields: Vec<FieldSelectorRequirement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOption {
    pub name: String,
    #[serde(default)]
    pub selector: OptionSelector,
}
