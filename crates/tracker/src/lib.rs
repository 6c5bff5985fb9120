//! Kiln tracker – remembers which pipelines read which objects so that a
//! change to the object re-enqueues the pipelines.

#![forbid(unsafe_code)]

mod enqueue;
mod registry;

use std::sync::{Arc, RwLock};

use kiln_core::apis::NamespacedName;
use kube::core::GroupVersionKind;
use metrics::counter;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::trace;

pub use enqueue::{EnqueueTracked, ReconcileRequest};
pub use registry::TypeRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("type {0} is not registered")]
    UnregisteredType(&'static str),
}

/// Identity of a tracked object: its kind plus namespaced name. Cluster-scoped
/// objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackerKey {
    pub gvk: GroupVersionKind,
    pub name: NamespacedName,
}

impl TrackerKey {
    pub fn new(gvk: GroupVersionKind, name: NamespacedName) -> Self {
        Self { gvk, name }
    }
}

type Dependents = FxHashMap<TrackerKey, FxHashSet<NamespacedName>>;

/// Shared handle; clones see the same map.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    inner: Arc<RwLock<Dependents>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` must be reconciled when `key` changes.
    pub fn track(&self, key: TrackerKey, dependent: NamespacedName) {
        trace!(kind = %key.gvk.kind, object = %key.name, dependent = %dependent, "track");
        let mut m = self.inner.write().unwrap_or_else(|e| e.into_inner());
        m.entry(key).or_default().insert(dependent);
    }

    /// Make `key` the only object `dependent` is tracked against, dropping
    /// edges left from earlier passes.
    pub fn retrack(&self, key: TrackerKey, dependent: NamespacedName) {
        trace!(kind = %key.gvk.kind, object = %key.name, dependent = %dependent, "retrack");
        let mut m = self.inner.write().unwrap_or_else(|e| e.into_inner());
        m.retain(|k, deps| {
            if k == &key {
                return true;
            }
            deps.remove(&dependent);
            !deps.is_empty()
        });
        m.entry(key).or_default().insert(dependent);
    }

    /// Dependents of `key`, sorted.
    pub fn lookup(&self, key: &TrackerKey) -> Vec<NamespacedName> {
        counter!("tracker_lookups", 1u64);
        let m = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<NamespacedName> = m.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default();
        out.sort();
        out
    }

    /// Forget every edge ending at `dependent`, e.g. once it is deleted.
    pub fn untrack_dependent(&self, dependent: &NamespacedName) {
        let mut m = self.inner.write().unwrap_or_else(|e| e.into_inner());
        m.retain(|_, deps| {
            deps.remove(dependent);
            !deps.is_empty()
        });
    }

    /// Drop every dependent for which `keep` is false. Returns how many
    /// edges were removed.
    pub fn retain_dependents(&self, mut keep: impl FnMut(&NamespacedName) -> bool) -> usize {
        let mut m = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        m.retain(|_, deps| {
            let before = deps.len();
            deps.retain(|d| keep(d));
            removed += before - deps.len();
            !deps.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
