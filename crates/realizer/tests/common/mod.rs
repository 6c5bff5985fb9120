#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kiln_core::apis::{
    ClusterRunTemplate, ClusterRunTemplateSpec, Pipeline, PipelineSpec, ResourceSelector, ResourceType,
    TemplateReference,
};
use kiln_kubehub::{gvk_of, ListQuery, Repository};
use serde_json::{json, Value};

/// In-memory cluster. Objects are plain JSON; listing filters by kind,
/// namespace and labels.
#[derive(Default)]
pub struct FakeRepository {
    pub templates: Vec<ClusterRunTemplate>,
    pub objects: Mutex<Vec<Value>>,
    /// Kinds whose list calls fail.
    pub failing_lists: BTreeSet<String>,
    pub reject_creates: Option<String>,
    /// Status given to objects as they are created.
    pub created_status: Option<Value>,
    pub requested_templates: Mutex<Vec<TemplateReference>>,
    pub ensure_calls: Mutex<Vec<(Value, bool)>>,
}

impl FakeRepository {
    pub fn with_template(mut self, t: ClusterRunTemplate) -> Self {
        self.templates.push(t);
        self
    }

    pub fn with_object(self, obj: Value) -> Self {
        self.objects.lock().unwrap().push(obj);
        self
    }

    pub fn objects(&self) -> Vec<Value> {
        self.objects.lock().unwrap().clone()
    }
}

fn same_identity(a: &Value, b: &Value) -> bool {
    a["kind"] == b["kind"] && a["metadata"]["name"] == b["metadata"]["name"] && a["metadata"]["namespace"] == b["metadata"]["namespace"]
}

#[async_trait]
impl Repository for FakeRepository {
    async fn get_run_template(&self, reference: &TemplateReference) -> Result<ClusterRunTemplate> {
        self.requested_templates.lock().unwrap().push(reference.clone());
        self.templates
            .iter()
            .find(|t| t.metadata.name.as_deref() == Some(reference.name.as_str()))
            .cloned()
            .ok_or_else(|| anyhow!("clusterruntemplates \"{}\" not found", reference.name))
    }

    async fn list_unstructured(&self, query: &ListQuery) -> Result<Vec<Value>> {
        if self.failing_lists.contains(&query.gvk.kind) {
            return Err(anyhow!("the server is currently unable to handle the request"));
        }
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|o| gvk_of(o).map(|g| g == query.gvk).unwrap_or(false))
            .filter(|o| match &query.namespace {
                Some(ns) => o["metadata"]["namespace"].as_str() == Some(ns.as_str()),
                None => true,
            })
            .filter(|o| query.matches_labels(o))
            .cloned()
            .collect())
    }

    async fn ensure_object_exists_on_cluster(&self, obj: &Value, allow_update: bool) -> Result<()> {
        self.ensure_calls.lock().unwrap().push((obj.clone(), allow_update));
        if let Some(msg) = &self.reject_creates {
            return Err(anyhow!("{}", msg));
        }
        let mut objects = self.objects.lock().unwrap();
        if obj["metadata"]["name"].is_string() && objects.iter().any(|o| same_identity(o, obj)) {
            return Ok(());
        }
        let mut created = obj.clone();
        if !created["metadata"]["name"].is_string() {
            let generated = format!("{}{}", created["metadata"]["generateName"].as_str().unwrap_or(""), objects.len());
            created["metadata"]["name"] = Value::String(generated);
        }
        created["metadata"]["creationTimestamp"] = json!(format!("2024-01-01T00:00:{:02}Z", objects.len()));
        if let Some(status) = &self.created_status {
            created["status"] = status.clone();
        }
        objects.push(created);
        Ok(())
    }
}

pub fn run_template(name: &str, outputs: &[(&str, &str)]) -> ClusterRunTemplate {
    ClusterRunTemplate::new(
        name,
        ClusterRunTemplateSpec {
            template: json!({
                "apiVersion": "tekton.dev/v1beta1",
                "kind": "TaskRun",
                "metadata": { "generateName": "$(pipeline.metadata.name)$-" },
                "spec": { "params": [{ "name": "url", "value": "$(selected.data.url)$" }] }
            }),
            outputs: outputs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        },
    )
}

pub fn plain_template(name: &str, outputs: &[(&str, &str)]) -> ClusterRunTemplate {
    ClusterRunTemplate::new(
        name,
        ClusterRunTemplateSpec {
            template: json!({
                "apiVersion": "tekton.dev/v1beta1",
                "kind": "TaskRun",
                "metadata": { "name": "$(pipeline.metadata.name)$-run" },
                "spec": { "serviceAccountName": "builder" }
            }),
            outputs: outputs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        },
    )
}

pub fn pipeline(template: &str, selector: Option<ResourceSelector>) -> Pipeline {
    let mut p = Pipeline::new(
        "build",
        PipelineSpec {
            run_template_ref: TemplateReference { kind: "SomethingElse".into(), name: template.into(), namespace: None },
            selector,
        },
    );
    p.metadata.namespace = Some("dev".into());
    p.metadata.uid = Some("0b7c2f4e-0000-0000-0000-000000000001".into());
    p.metadata.generation = Some(3);
    p
}

pub fn config_map_selector() -> ResourceSelector {
    ResourceSelector {
        resource: ResourceType { api_version: "v1".into(), kind: "ConfigMap".into() },
        matching_labels: [("app".to_string(), "web".to_string())].into_iter().collect(),
    }
}

pub fn config_map(name: &str, app: &str, url: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": "dev", "labels": { "app": app } },
        "data": { "url": url }
    })
}

pub fn succeeded_status(image: &str) -> Value {
    json!({
        "conditions": [{ "type": "Succeeded", "status": "True" }],
        "results": [{ "name": "image", "value": image }]
    })
}
