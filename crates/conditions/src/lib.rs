//! Condition aggregation for published status.
//!
//! A [`ConditionManager`] collects sub-conditions, each with a polarity, and
//! folds them into a parent condition. Entries that did not change keep their
//! previous `lastTransitionTime`, so repeated reconciles of a steady object
//! produce an identical status.

#![forbid(unsafe_code)]

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kiln_core::status;
use tracing::trace;

pub const READY_REASON: &str = "Ready";
pub const CONDITIONS_UNMET_REASON: &str = "ConditionsUnmet";
pub const UNKNOWN_STATE_REASON: &str = "ConditionInUnknownState";
pub const NO_CONDITIONS_REASON: &str = "NoConditionsReported";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// `True` is healthy.
    Positive,
    /// `False` is healthy.
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Health {
    Good,
    Unknown,
    Bad,
}

fn health(c: &Condition, polarity: Polarity) -> Health {
    let (good, bad) = match polarity {
        Polarity::Positive => (status::TRUE, status::FALSE),
        Polarity::Negative => (status::FALSE, status::TRUE),
    };
    if c.status == good {
        Health::Good
    } else if c.status == bad {
        Health::Bad
    } else {
        Health::Unknown
    }
}

/// Same type, status, reason and message. Timestamps are ignored.
pub fn same_state(a: &Condition, b: &Condition) -> bool {
    a.type_ == b.type_ && a.status == b.status && a.reason == b.reason && a.message == b.message
}

/// One per reconcile pass: add sub-conditions, then [`finalize`](Self::finalize).
#[derive(Debug, Clone)]
pub struct ConditionManager {
    parent_type: String,
    previous: Vec<Condition>,
    added: Vec<(Condition, Polarity)>,
}

impl ConditionManager {
    pub fn new(parent_type: impl Into<String>, previous: Vec<Condition>) -> Self {
        Self { parent_type: parent_type.into(), previous, added: Vec::new() }
    }

    pub fn add_positive(&mut self, condition: Condition) {
        self.added.push((condition, Polarity::Positive));
    }

    /// Recorded as given; only the parent's view of it is inverted.
    pub fn add_negative(&mut self, condition: Condition) {
        self.added.push((condition, Polarity::Negative));
    }

    /// True when at least one condition was added and none is unhealthy.
    pub fn is_successful(&self) -> bool {
        !self.added.is_empty() && self.worst() != Some(Health::Bad)
    }

    fn worst(&self) -> Option<Health> {
        self.added.iter().map(|(c, p)| health(c, *p)).max()
    }

    fn parent(&self) -> Condition {
        let (status, reason, message) = match self.worst() {
            None => (status::UNKNOWN, NO_CONDITIONS_REASON, "no conditions have been reported".to_string()),
            Some(Health::Bad) => {
                let unmet: Vec<&str> = self
                    .added
                    .iter()
                    .filter(|(c, p)| health(c, *p) == Health::Bad)
                    .map(|(c, _)| c.type_.as_str())
                    .collect();
                (status::FALSE, CONDITIONS_UNMET_REASON, format!("unmet conditions: {}", unmet.join(", ")))
            }
            Some(Health::Unknown) => (status::UNKNOWN, UNKNOWN_STATE_REASON, String::new()),
            Some(Health::Good) => (status::TRUE, READY_REASON, String::new()),
        };
        Condition {
            type_: self.parent_type.clone(),
            status: status.to_string(),
            reason: reason.to_string(),
            message,
            ..Default::default()
        }
    }

    /// Produce the condition list to publish: sub-conditions in the order they
    /// were added, the parent last. `changed` reports whether it differs from
    /// the previous list.
    ///
    /// Previously published types that were not added this pass are dropped.
    pub fn finalize(&self) -> (Vec<Condition>, bool) {
        let now = Time(Utc::now());
        let mut changed = false;
        let mut out = Vec::with_capacity(self.added.len() + 1);

        let candidates = self.added.iter().map(|(c, _)| c.clone()).chain(std::iter::once(self.parent()));
        for candidate in candidates {
            match self.previous.iter().find(|p| p.type_ == candidate.type_) {
                Some(prev) if same_state(prev, &candidate) => out.push(prev.clone()),
                _ => {
                    trace!(condition = %candidate.type_, status = %candidate.status, "condition transitioned");
                    changed = true;
                    out.push(Condition { last_transition_time: now.clone(), ..candidate });
                }
            }
        }

        if self.previous.iter().any(|p| !out.iter().any(|c| c.type_ == p.type_)) {
            changed = true;
        }
        (out, changed)
    }
}
