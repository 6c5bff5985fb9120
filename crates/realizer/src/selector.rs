//! Resolve a pipeline's `selector` to the single object it names.

use kiln_core::apis::ResourceSelector;
use kiln_kubehub::{gvk_from_parts, ListQuery, Repository};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("could not list objects matching selector: {0}")]
    ListFailed(String),
    #[error("selector did not match any objects")]
    NoMatch,
    #[error("selector matched multiple objects ({0})")]
    Ambiguous(usize),
}

/// `Ok(None)` when there is no selector. Otherwise exactly one object of the
/// selector's kind must carry all of its labels; that object is returned whole.
pub async fn resolve_selector(
    selector: Option<&ResourceSelector>,
    repository: &dyn Repository,
) -> Result<Option<Value>, SelectorError> {
    let Some(selector) = selector else { return Ok(None) };

    let query = ListQuery::new(gvk_from_parts(&selector.resource.api_version, &selector.resource.kind))
        .labels(selector.matching_labels.clone());
    let mut results = repository
        .list_unstructured(&query)
        .await
        .map_err(|e| SelectorError::ListFailed(format!("{:#}", e)))?;

    match results.len() {
        0 => Err(SelectorError::NoMatch),
        1 => Ok(results.pop()),
        n => Err(SelectorError::Ambiguous(n)),
    }
}
