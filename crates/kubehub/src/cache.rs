//! Remembers what was last submitted for objects stamped with `generateName`.
//!
//! Such objects have no name to look up before creating, so identity is the
//! submitted content: if the same content was already created and that object
//! still exists, it is not created again.

use std::sync::RwLock;

use kiln_core::value::canonical_eq;
use rustc_hash::FxHashMap;
use serde_json::Value;

#[derive(Debug, Clone)]
struct Submission {
    submitted: Value,
    persisted_name: String,
}

#[derive(Debug, Default)]
pub struct SubmissionCache {
    entries: RwLock<FxHashMap<String, Submission>>,
}

impl SubmissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `submitted` equals the last submission under `key` and the
    /// object created for it is among `existing`.
    pub fn unchanged(&self, key: &str, submitted: &Value, existing: &[Value]) -> bool {
        let entries = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(prev) = entries.get(key) else { return false };
        canonical_eq(&prev.submitted, submitted)
            && existing
                .iter()
                .any(|o| kiln_core::value::meta_str(o, "name") == Some(prev.persisted_name.as_str()))
    }

    pub fn record(&self, key: String, submitted: Value, persisted_name: String) {
        let mut entries = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key, Submission { submitted, persisted_name });
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
