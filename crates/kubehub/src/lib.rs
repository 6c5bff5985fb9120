//! Kiln kubehub – the repository seam between reconciliation and the cluster.
//!
//! [`Repository`] is what the realizer talks to; [`KubeRepository`] is the
//! kube-rs implementation over `DynamicObject`s.

#![forbid(unsafe_code)]

mod cache;
mod kube_repo;

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kiln_core::apis::{ClusterRunTemplate, TemplateReference};
use kiln_core::split_api_version;
use kube::core::GroupVersionKind;
use serde_json::Value;

pub use cache::SubmissionCache;
pub use kube_repo::{get_kube_client, KubeRepository};

/// Shape of a list call: one kind, optionally one namespace, all labels must
/// match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ListQuery {
    pub fn new(gvk: GroupVersionKind) -> Self {
        Self { gvk, namespace: None, labels: BTreeMap::new() }
    }

    pub fn namespace(mut self, ns: Option<&str>) -> Self {
        self.namespace = ns.map(str::to_string);
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Equality-based label selector, e.g. `app=web,tier=front`.
    pub fn label_selector(&self) -> String {
        self.labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
    }

    /// Whether `obj` carries every label of this query.
    pub fn matches_labels(&self, obj: &Value) -> bool {
        let labels = obj.get("metadata").and_then(|m| m.get("labels"));
        self.labels
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)).and_then(Value::as_str) == Some(v.as_str()))
    }
}

/// Cluster access needed by the realizer.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_run_template(&self, reference: &TemplateReference) -> Result<ClusterRunTemplate>;

    async fn list_unstructured(&self, query: &ListQuery) -> Result<Vec<Value>>;

    /// Create `obj` unless an object with the same identity exists. Existing
    /// objects are replaced only when `allow_update` is set.
    async fn ensure_object_exists_on_cluster(&self, obj: &Value, allow_update: bool) -> Result<()>;
}

pub fn gvk_from_parts(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = split_api_version(api_version);
    GroupVersionKind::gvk(group, version, kind)
}

/// Read `apiVersion`/`kind` of an unstructured object.
pub fn gvk_of(obj: &Value) -> Result<GroupVersionKind> {
    let api_version = obj.get("apiVersion").and_then(Value::as_str).ok_or_else(|| anyhow!("object missing apiVersion"))?;
    let kind = obj.get("kind").and_then(Value::as_str).ok_or_else(|| anyhow!("object missing kind"))?;
    Ok(gvk_from_parts(api_version, kind))
}

pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

pub fn labels_of(obj: &Value) -> BTreeMap<String, String> {
    obj.get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

pub(crate) fn strip_managed_fields(v: &mut Value) {
    if let Some(meta) = v.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("managedFields");
    }
}
