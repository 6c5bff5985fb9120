//! Render a raw object template against a templating context.
//!
//! Strings may embed `$(path)$` placeholders resolved against the context.
//! A string that is exactly one placeholder is replaced by the referenced
//! value (keeping its type); otherwise the value is interpolated as text.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kiln_core::value::{lookup, metadata_mut, render_scalar};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

const OPEN: &str = "$(";
const CLOSE: &str = ")$";

#[derive(Debug, Error, PartialEq)]
pub enum StampError {
    #[error("unable to resolve template path [{0}]")]
    Undefined(String),
    #[error("unterminated placeholder in [{0}]")]
    Unterminated(String),
    #[error("stamped object must be a map, found {0}")]
    NotAnObject(&'static str),
    #[error("stamped object is missing [{0}]")]
    MissingField(&'static str),
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Stamps templates for one owner: substitutes placeholders, then applies
/// traceability labels, the owner reference and the owner's namespace.
#[derive(Debug, Clone)]
pub struct Stamper {
    context: Value,
    labels: BTreeMap<String, String>,
    owner: Option<OwnerReference>,
    namespace: Option<String>,
}

impl Stamper {
    pub fn new(context: Value, labels: BTreeMap<String, String>) -> Self {
        Self { context, labels, owner: None, namespace: None }
    }

    pub fn with_owner(mut self, owner: Option<OwnerReference>, namespace: Option<String>) -> Self {
        self.owner = owner;
        self.namespace = namespace;
        self
    }

    pub fn stamp(&self, template: &Value) -> Result<Value, StampError> {
        let mut obj = self.substitute(template)?;
        if !obj.is_object() {
            return Err(StampError::NotAnObject(type_name(&obj)));
        }
        for field in ["apiVersion", "kind"] {
            if obj.get(field).and_then(Value::as_str).map(str::is_empty).unwrap_or(true) {
                return Err(StampError::MissingField(field));
            }
        }

        let meta = metadata_mut(&mut obj).ok_or(StampError::NotAnObject("mapping"))?;
        let has_name = ["name", "generateName"]
            .iter()
            .any(|k| meta.get(*k).and_then(Value::as_str).map(|s| !s.is_empty()).unwrap_or(false));
        if !has_name {
            return Err(StampError::MissingField("metadata.name or metadata.generateName"));
        }

        if let Some(ns) = &self.namespace {
            meta.entry("namespace").or_insert_with(|| Value::String(ns.clone()));
        }

        let labels = meta
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or(StampError::NotAnObject("mapping"))?;
        for (k, v) in &self.labels {
            labels.insert(k.clone(), Value::String(v.clone()));
        }

        if let Some(owner) = &self.owner {
            let owner_json = serde_json::to_value(owner).unwrap_or(Value::Null);
            let refs = meta.entry("ownerReferences").or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = refs {
                if !items.iter().any(|r| r.get("uid") == owner_json.get("uid")) {
                    items.push(owner_json);
                }
            }
        }
        debug!(kind = ?obj.get("kind"), "stamped template");
        Ok(obj)
    }

    fn substitute(&self, v: &Value) -> Result<Value, StampError> {
        Ok(match v {
            Value::String(s) => self.substitute_str(s)?,
            Value::Array(items) => {
                Value::Array(items.iter().map(|i| self.substitute(i)).collect::<Result<_, _>>()?)
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, i) in map {
                    out.insert(k.clone(), self.substitute(i)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }

    fn resolve(&self, expr: &str) -> Result<&Value, StampError> {
        let path = expr.trim();
        // an empty path would name the whole context
        if path.is_empty() {
            return Err(StampError::Undefined(path.to_string()));
        }
        lookup(&self.context, path).ok_or_else(|| StampError::Undefined(path.to_string()))
    }

    fn substitute_str(&self, s: &str) -> Result<Value, StampError> {
        if !s.contains(OPEN) {
            return Ok(Value::String(s.to_string()));
        }
        // whole-string placeholder keeps the referenced value's type
        if let Some(inner) = s.strip_prefix(OPEN).and_then(|r| r.strip_suffix(CLOSE)) {
            if !inner.contains(OPEN) && !inner.contains(CLOSE) {
                return Ok(self.resolve(inner)?.clone());
            }
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let end = after.find(CLOSE).ok_or_else(|| StampError::Unterminated(s.to_string()))?;
            out.push_str(&render_scalar(self.resolve(&after[..end])?));
            rest = &after[end + CLOSE.len()..];
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }
}
