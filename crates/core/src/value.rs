//! Attribute tree helpers over `serde_json::Value`.
//!
//! Paths use a minimal grammar: dot-separated fields with an optional single
//! `[index]` per segment, e.g. `status.conditions[0].type`. A leading `.` or
//! `$.` is accepted and ignored.

use serde_json::{Map, Value};

/// Strip the optional `$.`/`.` prefix from a path expression.
pub fn normalize_path(path: &str) -> &str {
    let p = path.trim();
    let p = p.strip_prefix('$').unwrap_or(p);
    p.strip_prefix('.').unwrap_or(p)
}

fn split_segment(seg: &str) -> Option<(&str, Option<usize>)> {
    match seg.find('[') {
        Some(brk) => {
            let rest = seg.get(brk + 1..)?;
            let end = rest.find(']')?;
            if end + 1 != rest.len() {
                return None;
            }
            let idx: usize = rest[..end].parse().ok()?;
            Some((&seg[..brk], Some(idx)))
        }
        None => Some((seg, None)),
    }
}

/// Follow `path` into `root`. Returns `None` when any segment is missing or
/// malformed. An empty path yields `root` itself.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = normalize_path(path);
    if path.is_empty() {
        return Some(root);
    }
    let mut cur = root;
    for seg in path.split('.') {
        if seg.is_empty() {
            return None;
        }
        let (key, idx) = split_segment(seg)?;
        if !key.is_empty() {
            cur = cur.as_object()?.get(key)?;
        }
        if let Some(i) = idx {
            cur = cur.as_array()?.get(i)?;
        }
    }
    Some(cur)
}

/// Render a scalar for string interpolation. Containers are rendered as
/// compact JSON.
pub fn render_scalar(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Structural equality with explicit semantics: sequences are order
/// significant, mappings must have the same key set and equal values per key,
/// numbers compare by their JSON text so `1` and `1.0` differ.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.to_string() == y.to_string(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| canonical_eq(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => maps_eq(xm, ym),
        _ => false,
    }
}

fn maps_eq(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, av)| b.get(k).map(|bv| canonical_eq(av, bv)).unwrap_or(false))
}

/// Mutable access to `metadata`, creating it when absent.
/// Returns `None` when `obj` is not a JSON object.
pub fn metadata_mut(obj: &mut Value) -> Option<&mut Map<String, Value>> {
    obj.as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

pub fn meta_str<'a>(obj: &'a Value, field: &str) -> Option<&'a str> {
    obj.get("metadata")?.get(field)?.as_str()
}
