//! `RunTemplateReady` conditions, one constructor per realize stage.

use std::fmt::Display;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kiln_core::apis::RUN_TEMPLATE_READY;
use kiln_core::status;

pub const READY: &str = "Ready";
pub const TEMPLATE_MISSING: &str = "TemplateMissing";
pub const TEMPLATE_STAMP_FAILURE: &str = "TemplateStampFailure";
pub const STAMP_REJECTED: &str = "StampRejected";
pub const LIST_FAILED: &str = "ListFailed";
pub const OUTPUT_EXTRACTION_FAILED: &str = "OutputExtractionFailed";

fn run_template_condition(status: &str, reason: &str, message: String) -> Condition {
    Condition {
        type_: RUN_TEMPLATE_READY.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message,
        ..Default::default()
    }
}

pub fn run_template_ready() -> Condition {
    run_template_condition(status::TRUE, READY, String::new())
}

pub fn template_missing(err: impl Display) -> Condition {
    run_template_condition(status::FALSE, TEMPLATE_MISSING, err.to_string())
}

pub fn template_stamp_failure(err: impl Display) -> Condition {
    run_template_condition(status::FALSE, TEMPLATE_STAMP_FAILURE, err.to_string())
}

pub fn stamp_rejected(err: impl Display) -> Condition {
    run_template_condition(status::FALSE, STAMP_REJECTED, err.to_string())
}

/// The object was applied; only inspecting it afterwards failed.
pub fn list_failed(err: impl Display) -> Condition {
    run_template_condition(status::UNKNOWN, LIST_FAILED, err.to_string())
}

pub fn output_extraction_failed(err: impl Display) -> Condition {
    run_template_condition(status::UNKNOWN, OUTPUT_EXTRACTION_FAILED, err.to_string())
}
