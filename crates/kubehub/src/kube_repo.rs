use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kiln_core::apis::{ClusterRunTemplate, TemplateReference};
use kiln_core::value::meta_str;
use kube::{
    api::{Api, ListParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::counter;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::{gvk_key, gvk_of, labels_of, strip_managed_fields, ListQuery, Repository, SubmissionCache};

const FIELD_MANAGER: &str = "kiln";

pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from the default config")
}

/// Repository backed by the API server. Discovery results are cached per
/// kind for the life of the repository.
#[derive(Clone)]
pub struct KubeRepository {
    client: Client,
    resources: Arc<RwLock<FxHashMap<String, (ApiResource, bool)>>>,
    submissions: Arc<SubmissionCache>,
}

impl KubeRepository {
    pub fn new(client: Client) -> Self {
        Self { client, resources: Arc::default(), submissions: Arc::new(SubmissionCache::new()) }
    }

    fn cached_resource(&self, key: &str) -> Option<(ApiResource, bool)> {
        self.resources.read().ok().and_then(|m| m.get(key).cloned())
    }

    async fn find_api_resource(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, bool)> {
        let key = gvk_key(gvk);
        if let Some(hit) = self.cached_resource(&key) {
            return Ok(hit);
        }
        let discovery = Discovery::new(self.client.clone()).filter(&[gvk.group.as_str()]).run().await?;
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                    let namespaced = matches!(caps.scope, Scope::Namespaced);
                    if let Ok(mut m) = self.resources.write() {
                        m.insert(key.clone(), (ar.clone(), namespaced));
                    }
                    debug!(gvk = %key, namespaced, "resolved api resource");
                    return Ok((ar, namespaced));
                }
            }
        }
        Err(anyhow!("GVK not found: {}", key))
    }

    async fn dynamic_api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let (ar, namespaced) = self.find_api_resource(gvk).await?;
        Ok(match (namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        })
    }

    async fn create(&self, api: &Api<DynamicObject>, obj: &DynamicObject) -> Result<Option<String>> {
        let pp = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
        match api.create(&pp, obj).await {
            Ok(created) => {
                counter!("repository_creates_total", 1u64);
                Ok(created.metadata.name)
            }
            // lost a race with another pass; the object exists now
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(obj.metadata.name.clone()),
            Err(e) => Err(anyhow!("create rejected: {}", e)),
        }
    }
}

#[async_trait]
impl Repository for KubeRepository {
    async fn get_run_template(&self, reference: &TemplateReference) -> Result<ClusterRunTemplate> {
        let api: Api<ClusterRunTemplate> = Api::all(self.client.clone());
        api.get(&reference.name)
            .await
            .with_context(|| format!("getting {} [{}]", reference.kind, reference.name))
    }

    async fn list_unstructured(&self, query: &ListQuery) -> Result<Vec<Value>> {
        let api = self.dynamic_api(&query.gvk, query.namespace.as_deref()).await?;
        let mut lp = ListParams::default();
        if !query.labels.is_empty() {
            lp = lp.labels(&query.label_selector());
        }
        let list = api
            .list(&lp)
            .await
            .with_context(|| format!("listing {} ({})", gvk_key(&query.gvk), query.label_selector()))?;

        let api_version = query.gvk.api_version();
        let mut out = Vec::with_capacity(list.items.len());
        for item in list.items {
            let mut v = serde_json::to_value(&item).context("serializing DynamicObject")?;
            strip_managed_fields(&mut v);
            if let Some(m) = v.as_object_mut() {
                m.entry("apiVersion").or_insert_with(|| Value::String(api_version.clone()));
                m.entry("kind").or_insert_with(|| Value::String(query.gvk.kind.clone()));
            }
            out.push(v);
        }
        Ok(out)
    }

    async fn ensure_object_exists_on_cluster(&self, obj: &Value, allow_update: bool) -> Result<()> {
        let gvk = gvk_of(obj)?;
        let ns = meta_str(obj, "namespace");
        let api = self.dynamic_api(&gvk, ns).await?;
        let dynamic: DynamicObject = serde_json::from_value(obj.clone()).context("decoding stamped object")?;

        if let Some(name) = meta_str(obj, "name").filter(|n| !n.is_empty()) {
            return match api.get_opt(name).await? {
                Some(_) if !allow_update => {
                    debug!(gvk = %gvk_key(&gvk), name, "object exists; leaving it untouched");
                    Ok(())
                }
                Some(live) => {
                    let mut next = dynamic;
                    next.metadata.resource_version = live.metadata.resource_version;
                    let pp = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
                    api.replace(name, &pp, &next).await.map_err(|e| anyhow!("update rejected: {}", e))?;
                    counter!("repository_updates_total", 1u64);
                    Ok(())
                }
                None => {
                    self.create(&api, &dynamic).await?;
                    info!(gvk = %gvk_key(&gvk), name, "created object");
                    Ok(())
                }
            };
        }

        let query = ListQuery::new(gvk.clone()).namespace(ns).labels(labels_of(obj));
        let key = format!("{}/{}/{}", gvk_key(&gvk), ns.unwrap_or_default(), query.label_selector());
        let existing = self.list_unstructured(&query).await?;
        if self.submissions.unchanged(&key, obj, &existing) {
            debug!(key = %key, "submission unchanged since last create");
            return Ok(());
        }
        let created = self.create(&api, &dynamic).await?.unwrap_or_default();
        info!(gvk = %gvk_key(&gvk), name = %created, "created object from generateName");
        self.submissions.record(key, obj.clone(), created);
        Ok(())
    }
}
