//! Level-triggered reconcile loop over pipelines.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use futures::StreamExt;
use kiln_core::apis::{ClusterRunTemplate, NamespacedName, Pipeline, PipelineStatus};
use kiln_kubehub::KubeRepository;
use kiln_realizer::{reconcile_status, Realizer};
use kiln_tracker::{EnqueueTracked, ReconcileRequest, Tracker, TrackerKey, TypeRegistry};
use kube::api::{Api, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, ResourceExt};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, info};

const FIELD_MANAGER: &str = "kiln-controller";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("pipeline {0} has no namespace")]
    MissingNamespace(String),
    #[error("failed to update status of {name}: {source}")]
    Status {
        name: String,
        #[source]
        source: kube::Error,
    },
}

pub struct Context {
    client: Client,
    repository: KubeRepository,
    realizer: Realizer,
    tracker: Tracker,
    template_gvk: GroupVersionKind,
    requeue: Duration,
}

pub async fn run(client: Client, namespace: Option<String>, requeue: Duration) -> Result<()> {
    let mut registry = TypeRegistry::new();
    registry.register::<Pipeline>().register::<ClusterRunTemplate>();

    let tracker = Tracker::new();
    let enqueue = EnqueueTracked::new::<ClusterRunTemplate>(tracker.clone(), &registry)
        .context("resolving watched template type")?;

    let ctx = Arc::new(Context {
        client: client.clone(),
        repository: KubeRepository::new(client.clone()),
        realizer: Realizer::new(),
        tracker,
        template_gvk: enqueue.gvk().clone(),
        requeue,
    });

    let pipelines: Api<Pipeline> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let templates: Api<ClusterRunTemplate> = Api::all(client);

    info!(namespace = ?namespace, requeue_secs = requeue.as_secs(), "starting pipeline controller");
    let controller = Controller::new(pipelines, WatcherConfig::default()).watches(
        templates,
        WatcherConfig::default(),
        move |template: ClusterRunTemplate| {
            enqueue
                .map_to_requests(&template)
                .into_iter()
                .map(|r| r.object_ref::<Pipeline>())
                .collect::<Vec<ObjectRef<Pipeline>>>()
        },
    );
    // deleted pipelines never reach reconcile, so their edges are swept here
    let sweeper = tokio::spawn(sweep_loop(ctx.tracker.clone(), controller.store(), requeue));

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => debug!(pipeline = %obj, ?action, "reconciled"),
                Err(e) => error!(error = %e, "reconcile loop error"),
            }
        })
        .await;
    sweeper.abort();
    info!("pipeline controller stopped");
    Ok(())
}

async fn reconcile(pipeline: Arc<Pipeline>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let name = pipeline.name_any();
    let namespace = pipeline.namespace().ok_or_else(|| ReconcileError::MissingNamespace(name.clone()))?;
    let dependent = NamespacedName::new(namespace.as_str(), name.as_str());

    ctx.tracker.retrack(
        TrackerKey::new(ctx.template_gvk.clone(), NamespacedName::new("", pipeline.spec.run_template_ref.name.as_str())),
        dependent.clone(),
    );

    let outcome = ctx.realizer.realize(&pipeline, &ctx.repository).await;
    let (status, changed) = reconcile_status(&pipeline, &outcome);
    if changed {
        let api: Api<Pipeline> = Api::namespaced(ctx.client.clone(), &namespace);
        let patch = status_patch(pipeline.status.as_ref(), &status);
        api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|source| ReconcileError::Status { name: dependent.to_string(), source })?;
        info!(pipeline = %dependent, reason = %outcome.condition.reason, "status updated");
    }
    Ok(Action::requeue(ctx.requeue))
}

fn error_policy(pipeline: Arc<Pipeline>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    error!(?error, pipeline = %pipeline.name_any(), "reconciliation failed");
    Action::requeue(ctx.requeue)
}

/// Drop tracker edges of pipelines that are no longer in the controller's
/// cache. Returns how many edges were removed.
pub fn sweep_deleted(tracker: &Tracker, pipelines: &Store<Pipeline>) -> usize {
    tracker.retain_dependents(|d| {
        let r = ReconcileRequest { name: d.clone() }.object_ref::<Pipeline>();
        pipelines.get(&r).is_some()
    })
}

async fn sweep_loop(tracker: Tracker, pipelines: Store<Pipeline>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = sweep_deleted(&tracker, &pipelines);
        if removed > 0 {
            info!(removed, remaining = tracker.len(), "dropped tracking for deleted pipelines");
        }
    }
}

/// Merge patch for `next`. Outputs that disappeared are nulled so the merge
/// removes them.
pub fn status_patch(previous: Option<&PipelineStatus>, next: &PipelineStatus) -> Value {
    let mut outputs: Map<String, Value> = next.outputs.clone().into_iter().collect();
    if let Some(prev) = previous {
        for key in prev.outputs.keys() {
            outputs.entry(key.clone()).or_insert(Value::Null);
        }
    }
    json!({
        "status": {
            "conditions": next.conditions,
            "outputs": outputs,
            "observedGeneration": next.observed_generation,
        }
    })
}
