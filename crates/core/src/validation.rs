//! Validation of template options and their field selector requirements.

use thiserror::Error;

use crate::apis::{FieldSelectorOperator, FieldSelectorRequirement, TemplateOption};
use crate::value::canonical_eq;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cannot specify values with operator [{0}]")]
    UnexpectedValues(FieldSelectorOperator),
    #[error("must specify values with operator [{0}]")]
    MissingValues(FieldSelectorOperator),
    #[error("operator [{0}] is invalid")]
    InvalidOperator(String),
    #[error("requirement key [{0}] is not a valid path")]
    InvalidPath(String),
    #[error("error validating option [{name}]: {source}")]
    Option {
        name: String,
        #[source]
        source: Box<ValidationError>,
    },
    #[error("duplicate selector found in options [{first}, {second}]")]
    DuplicateSelector { first: String, second: String },
}

/// Check every requirement's operator/value arity and that its key is an
/// allowed path or starts with an allowed prefix.
pub fn validate_requirements(
    requirements: &[FieldSelectorRequirement],
    valid_paths: &[&str],
    valid_prefixes: &[&str],
) -> Result<(), ValidationError> {
    for req in requirements {
        match &req.operator {
            op @ (FieldSelectorOperator::Exists | FieldSelectorOperator::DoesNotExist) => {
                if !req.values.is_empty() {
                    return Err(ValidationError::UnexpectedValues(op.clone()));
                }
            }
            op @ (FieldSelectorOperator::In | FieldSelectorOperator::NotIn) => {
                if req.values.is_empty() {
                    return Err(ValidationError::MissingValues(op.clone()));
                }
            }
            FieldSelectorOperator::Unrecognized(s) => {
                return Err(ValidationError::InvalidOperator(s.clone()));
            }
        }

        if !valid_path(&req.key, valid_paths, valid_prefixes) {
            return Err(ValidationError::InvalidPath(req.key.clone()));
        }
    }
    Ok(())
}

fn valid_path(path: &str, valid_paths: &[&str], valid_prefixes: &[&str]) -> bool {
    valid_paths.contains(&path) || valid_prefixes.iter().any(|p| path.starts_with(p))
}

/// Validate every option, then reject any two differently named options whose
/// selectors are structurally identical.
pub fn validate_options(
    options: &[TemplateOption],
    valid_paths: &[&str],
    valid_prefixes: &[&str],
) -> Result<(), ValidationError> {
    for option in options {
        validate_requirements(&option.selector.match_fields, valid_paths, valid_prefixes).map_err(|e| {
            ValidationError::Option { name: option.name.clone(), source: Box::new(e) }
        })?;
    }

    // serializing plain data structs cannot fail; fall back to Null just in case
    let trees: Vec<serde_json::Value> = options
        .iter()
        .map(|o| serde_json::to_value(&o.selector).unwrap_or(serde_json::Value::Null))
        .collect();

    for (i, first) in options.iter().enumerate() {
        for (j, second) in options.iter().enumerate().skip(i + 1) {
            if first.name != second.name && canonical_eq(&trees[i], &trees[j]) {
                return Err(ValidationError::DuplicateSelector {
                    first: first.name.clone(),
                    second: second.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::OptionSelector;

    const PATHS: &[&str] = &["workload.metadata.name"];
    const PREFIXES: &[&str] = &["workload.spec.", "workload.metadata.labels"];

    fn req(key: &str, op: &str, values: &[&str]) -> FieldSelectorRequirement {
        FieldSelectorRequirement {
            key: key.into(),
            operator: FieldSelectorOperator::from(op.to_string()),
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn option(name: &str, reqs: Vec<FieldSelectorRequirement>) -> TemplateOption {
        TemplateOption { name: name.into(), selector: OptionSelector { match_fields: reqs } }
    }

    #[test]
    fn exists_with_values_is_rejected() {
        let err = validate_requirements(&[req("workload.spec.source", "Exists", &["x"])], PATHS, PREFIXES)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot specify values with operator [Exists]");
    }

    #[test]
    fn in_without_values_is_rejected() {
        let err = validate_requirements(&[req("workload.spec.source", "In", &[])], PATHS, PREFIXES).unwrap_err();
        assert_eq!(err, ValidationError::MissingValues(FieldSelectorOperator::In));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = validate_requirements(&[req("workload.spec.source", "Like", &["a"])], PATHS, PREFIXES)
            .unwrap_err();
        assert_eq!(err.to_string(), "operator [Like] is invalid");
    }

    #[test]
    fn keys_must_be_allowed_paths_or_prefixed() {
        assert!(validate_requirements(&[req("workload.metadata.name", "Exists", &[])], PATHS, PREFIXES).is_ok());
        assert!(validate_requirements(
            &[req("workload.metadata.labels.app", "NotIn", &["web"])],
            PATHS,
            PREFIXES
        )
        .is_ok());
        let err = validate_requirements(&[req("workload.status.x", "DoesNotExist", &[])], PATHS, PREFIXES)
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidPath("workload.status.x".into()));
    }

    #[test]
    fn option_errors_name_the_option() {
        let opts = vec![
            option("ok", vec![req("workload.spec.a", "Exists", &[])]),
            option("broken", vec![req("bad.key", "Exists", &[])]),
        ];
        let err = validate_options(&opts, PATHS, PREFIXES).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error validating option [broken]: requirement key [bad.key] is not a valid path"
        );
    }

    #[test]
    fn identical_selectors_are_rejected_naming_both() {
        let opts = vec![
            option("one", vec![req("workload.spec.source.git", "Exists", &[])]),
            option("two", vec![req("workload.spec.source.image", "Exists", &[])]),
            option("three", vec![req("workload.spec.source.git", "Exists", &[])]),
        ];
        let err = validate_options(&opts, PATHS, PREFIXES).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateSelector { first: "one".into(), second: "three".into() }
        );
    }

    #[test]
    fn requirement_and_value_order_is_significant() {
        let opts = vec![
            option(
                "a",
                vec![req("workload.spec.x", "In", &["1", "2"]), req("workload.spec.y", "Exists", &[])],
            ),
            option(
                "b",
                vec![req("workload.spec.y", "Exists", &[]), req("workload.spec.x", "In", &["1", "2"])],
            ),
            option("c", vec![req("workload.spec.x", "In", &["2", "1"])]),
            option("d", vec![req("workload.spec.x", "In", &["1", "2"])]),
        ];
        assert!(validate_options(&opts, PATHS, PREFIXES).is_ok());
    }
}
