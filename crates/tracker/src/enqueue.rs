use kiln_core::apis::NamespacedName;
use kube::core::GroupVersionKind;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use tracing::debug;

use crate::{Tracker, TrackerError, TrackerKey, TypeRegistry};

/// A dependent to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileRequest {
    pub name: NamespacedName,
}

impl ReconcileRequest {
    pub fn object_ref<K>(&self) -> ObjectRef<K>
    where
        K: Resource<DynamicType = ()>,
    {
        let r = ObjectRef::new(&self.name.name);
        if self.name.namespace.is_empty() {
            r
        } else {
            r.within(&self.name.namespace)
        }
    }
}

/// Maps a change of a watched object to requests for every pipeline that
/// tracked it. The watched kind is fixed at construction.
#[derive(Debug, Clone)]
pub struct EnqueueTracked {
    gvk: GroupVersionKind,
    tracker: Tracker,
}

impl EnqueueTracked {
    /// Fails when `K` was never registered; callers treat that as fatal.
    pub fn new<K: 'static>(tracker: Tracker, registry: &TypeRegistry) -> Result<Self, TrackerError> {
        let gvk = registry.gvk_of::<K>()?;
        Ok(Self { gvk, tracker })
    }

    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    pub fn map_to_requests<T: ResourceExt>(&self, trigger: &T) -> Vec<ReconcileRequest> {
        let key = TrackerKey::new(
            self.gvk.clone(),
            NamespacedName::new(trigger.namespace().unwrap_or_default(), trigger.name_any()),
        );
        let requests: Vec<ReconcileRequest> =
            self.tracker.lookup(&key).into_iter().map(|name| ReconcileRequest { name }).collect();
        debug!(kind = %self.gvk.kind, object = %key.name, requests = requests.len(), "enqueue tracked");
        requests
    }
}
