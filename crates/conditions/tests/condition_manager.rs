use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kiln_conditions::{
    ConditionManager, CONDITIONS_UNMET_REASON, NO_CONDITIONS_REASON, READY_REASON, UNKNOWN_STATE_REASON,
};

fn cond(t: &str, s: &str) -> Condition {
    Condition { type_: t.into(), status: s.into(), ..Default::default() }
}

fn find<'a>(list: &'a [Condition], t: &str) -> &'a Condition {
    list.iter().find(|c| c.type_ == t).unwrap_or_else(|| panic!("missing condition {}", t))
}

#[test]
fn empty_manager_reports_unknown_parent_only() {
    let m = ConditionManager::new("HappyParent", vec![]);
    let (out, changed) = m.finalize();
    assert!(changed);
    assert!(!m.is_successful());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].type_, "HappyParent");
    assert_eq!(out[0].status, "Unknown");
    assert_eq!(out[0].reason, NO_CONDITIONS_REASON);
}

#[test]
fn all_positive_true_yields_ready_parent_last() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("Goodness", "True"));
    m.add_positive(cond("Greatness", "True"));
    let (out, changed) = m.finalize();
    assert!(changed);
    assert!(m.is_successful());
    let types: Vec<&str> = out.iter().map(|c| c.type_.as_str()).collect();
    assert_eq!(types, vec!["Goodness", "Greatness", "HappyParent"]);
    assert_eq!(out[2].status, "True");
    assert_eq!(out[2].reason, READY_REASON);
}

#[test]
fn positive_false_fails_the_parent() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("Goodness", "True"));
    m.add_positive(cond("Greatness", "False"));
    let (out, _) = m.finalize();
    assert!(!m.is_successful());
    assert_eq!(find(&out, "Greatness").status, "False");
    let parent = find(&out, "HappyParent");
    assert_eq!(parent.status, "False");
    assert_eq!(parent.reason, CONDITIONS_UNMET_REASON);
}

#[test]
fn negative_polarity_inverts_health_but_not_the_record() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("Goodness", "True"));
    m.add_negative(cond("Badness", "False"));
    let (out, _) = m.finalize();
    assert!(m.is_successful());
    assert_eq!(find(&out, "Badness").status, "False");
    assert_eq!(find(&out, "HappyParent").status, "True");

    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("Goodness", "True"));
    m.add_negative(cond("Badness", "True"));
    let (out, _) = m.finalize();
    assert!(!m.is_successful());
    assert_eq!(find(&out, "Badness").status, "True");
    assert_eq!(find(&out, "HappyParent").reason, CONDITIONS_UNMET_REASON);
}

#[test]
fn bad_beats_unknown_beats_good() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("some type", "True"));
    m.add_positive(cond("another type", "False"));
    m.add_positive(cond("additional type", "Unknown"));
    let (out, _) = m.finalize();
    assert_eq!(find(&out, "HappyParent").status, "False");

    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("some type", "True"));
    m.add_negative(cond("another type", "Unknown"));
    m.add_positive(cond("additional type", "True"));
    let (out, _) = m.finalize();
    assert!(m.is_successful());
    let parent = find(&out, "HappyParent");
    assert_eq!(parent.status, "Unknown");
    assert_eq!(parent.reason, UNKNOWN_STATE_REASON);
}

#[test]
fn plain_string_false_status_counts_as_false() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(Condition { type_: "Goodness".into(), status: String::from("False"), ..Default::default() });
    let (out, changed) = m.finalize();
    assert!(changed);
    assert_eq!(out.len(), 2);
    assert_eq!(find(&out, "HappyParent").reason, CONDITIONS_UNMET_REASON);
}

#[test]
fn unchanged_conditions_are_reused_verbatim() {
    let goodness = cond("Goodness", "True");
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(goodness.clone());
    let (first, changed) = m.finalize();
    assert!(changed);

    std::thread::sleep(std::time::Duration::from_millis(5));

    let mut m = ConditionManager::new("HappyParent", first.clone());
    m.add_positive(goodness);
    let (second, changed) = m.finalize();
    assert!(!changed);
    assert_eq!(second, first);
}

#[test]
fn reason_change_restamps_only_that_condition() {
    let mut goodness = cond("Goodness", "True");
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(goodness.clone());
    let (first, _) = m.finalize();

    std::thread::sleep(std::time::Duration::from_millis(5));

    goodness.reason = "Dog ate homework".into();
    let mut m = ConditionManager::new("HappyParent", first.clone());
    m.add_positive(goodness);
    let (second, changed) = m.finalize();
    assert!(changed);
    assert_ne!(second[0], first[0]);
    assert!(second[0].last_transition_time.0 > first[0].last_transition_time.0);
    assert_eq!(second[1], first[1]);
}

#[test]
fn dropped_types_mark_the_list_changed() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("Goodness", "True"));
    m.add_positive(cond("Greatness", "True"));
    let (first, _) = m.finalize();

    let mut m = ConditionManager::new("HappyParent", first.clone());
    m.add_positive(cond("Goodness", "True"));
    let (second, changed) = m.finalize();
    assert!(changed);
    assert_eq!(second.len(), 2);
    assert_eq!(second[0], first[0]);
    assert_eq!(second[1], first[2]);
}

#[test]
fn empty_pass_over_previous_list_keeps_only_the_parent() {
    let mut m = ConditionManager::new("HappyParent", vec![]);
    m.add_positive(cond("Goodness", "True"));
    let (first, _) = m.finalize();

    let m = ConditionManager::new("HappyParent", first);
    let (second, changed) = m.finalize();
    assert!(changed);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].status, "Unknown");

    let m = ConditionManager::new("HappyParent", second.clone());
    let (third, changed) = m.finalize();
    assert!(!changed);
    assert_eq!(third, second);
}
