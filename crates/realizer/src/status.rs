use kiln_conditions::ConditionManager;
use kiln_core::apis::{Pipeline, PipelineStatus, PIPELINE_READY};

use crate::RealizeOutcome;

/// Fold a realize outcome into the pipeline's next status. The flag is true
/// when the result differs from what is currently published.
pub fn reconcile_status(pipeline: &Pipeline, outcome: &RealizeOutcome) -> (PipelineStatus, bool) {
    let previous = pipeline.status.clone().unwrap_or_default();

    let mut manager = ConditionManager::new(PIPELINE_READY, previous.conditions.clone());
    manager.add_positive(outcome.condition.clone());
    let (conditions, conditions_changed) = manager.finalize();

    let outputs = outcome.outputs.clone().unwrap_or_else(|| previous.outputs.clone());
    let observed_generation = pipeline.metadata.generation;

    let changed = conditions_changed
        || outputs != previous.outputs
        || observed_generation != previous.observed_generation
        || pipeline.status.is_none();
    (PipelineStatus { conditions, outputs, observed_generation }, changed)
}
