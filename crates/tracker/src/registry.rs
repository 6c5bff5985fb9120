use std::any::{type_name, TypeId};

use kube::core::GroupVersionKind;
use kube::Resource;
use rustc_hash::FxHashMap;

use crate::TrackerError;

/// Rust resource types the process knows how to watch, by `TypeId`.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    kinds: FxHashMap<TypeId, GroupVersionKind>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<K>(&mut self) -> &mut Self
    where
        K: Resource<DynamicType = ()> + 'static,
    {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.kinds.insert(TypeId::of::<K>(), gvk);
        self
    }

    pub fn gvk_of<K: 'static>(&self) -> Result<GroupVersionKind, TrackerError> {
        self.kinds.get(&TypeId::of::<K>()).cloned().ok_or(TrackerError::UnregisteredType(type_name::<K>()))
    }
}
