use std::sync::Arc;

use super::common::*;
use crate::workflows::registration::{
    ActivityId, ActivityLookup, ActivityRecord, EligibilityEvaluator, EligibilityReason,
    Ineligibility, MemoryBackend, MemoryDirectory, RegistrationServiceError,
};

fn evaluator(backend: &MemoryBackend) -> EligibilityEvaluator {
    EligibilityEvaluator::new(
        Arc::new(backend.registrations.clone()),
        Arc::new(backend.directory.clone()),
    )
}

fn check(backend: &MemoryBackend, activity_id: &str) -> Result<ActivityRecord, Ineligibility> {
    evaluator(backend).assess(
        &ActivityId(activity_id.to_string()),
        STUDENT_NRP,
        &token(STUDENT),
    )
}

#[test]
fn student_without_registrations_is_eligible_for_open_activity() {
    let backend = backend();
    let service = build_service(&backend);

    let verdict = service
        .check_eligibility(&ActivityId("act-a".to_string()), &token(STUDENT))
        .expect("check runs");

    assert!(verdict.eligible);
    assert_eq!(verdict.reason, EligibilityReason::Eligible);
    assert_eq!(verdict.message, "User is eligible to register for this activity");
}

#[test]
fn overlapping_period_is_rejected_and_later_start_accepted() {
    let backend = backend();
    seed_registration(&backend, "act-b", "2023-12-01T00:00:00Z");
    let service = build_service(&backend);

    let inside = service
        .check_eligibility(&ActivityId("act-c".to_string()), &token(STUDENT))
        .expect("check runs");
    assert!(!inside.eligible);
    assert_eq!(inside.reason, EligibilityReason::OverlappingPeriod);
    assert_eq!(
        inside.message,
        "User already registered for an overlapping activity period"
    );

    let after = service
        .check_eligibility(&ActivityId("act-d".to_string()), &token(STUDENT))
        .expect("check runs");
    assert!(after.eligible);
}

#[test]
fn start_on_the_exact_end_of_the_previous_activity_overlaps() {
    let backend = backend();
    seed_registration(&backend, "act-b", "2023-12-01T00:00:00Z");

    match check(&backend, "act-e") {
        Err(Ineligibility::OverlappingPeriod {
            existing_activity,
            existing_end,
            candidate_start,
        }) => {
            assert_eq!(existing_activity, ActivityId("act-b".to_string()));
            assert_eq!(existing_end, candidate_start);
        }
        other => panic!("expected overlap, got {other:?}"),
    }
}

#[test]
fn repeated_registration_for_the_same_activity_is_rejected() {
    let backend = backend();
    seed_registration(&backend, "act-a", "2023-12-01T00:00:00Z");

    assert_eq!(check(&backend, "act-a"), Err(Ineligibility::AlreadyRegistered));
}

#[test]
fn only_the_most_recent_registration_is_compared() {
    let backend = backend();
    seed_registration(&backend, "act-c", "2023-11-01T00:00:00Z");
    seed_registration(&backend, "act-a", "2023-12-01T00:00:00Z");

    // act-a ends 2024-03-01, act-d starts 2024-04-02
    let accepted = check(&backend, "act-d").expect("eligible");
    assert_eq!(accepted.id.as_deref(), Some("act-d"));
}

#[test]
fn unknown_and_unopened_activities_are_not_eligible() {
    let backend = backend();

    assert_eq!(check(&backend, "act-missing"), Err(Ineligibility::ActivityNotFound));
    assert_eq!(check(&backend, "act-draft"), Err(Ineligibility::ActivityNotOpen));

    let verdict = evaluator(&backend).check(
        &ActivityId("act-draft".to_string()),
        STUDENT_NRP,
        &token(STUDENT),
    );
    assert!(!verdict.eligible);
    assert_eq!(verdict.reason, EligibilityReason::ActivityNotOpen);
    assert_eq!(verdict.message, "This activity is not open for registration");
}

#[test]
fn malformed_timing_data_is_a_hard_failure() {
    let backend = backend();
    seed_registration(&backend, "act-b", "2023-12-01T00:00:00Z");
    let mut broken = activity("act-b", "2024-01-01T00:00:00Z", 3, "APPROVED");
    broken.months_duration = None;
    backend
        .directory
        .upsert_activity(broken)
        .expect("directory writable");

    match check(&backend, "act-d") {
        Err(Ineligibility::InvalidActivityData(err)) => {
            assert_eq!(err.field, "months_duration");
        }
        other => panic!("expected invalid data, got {other:?}"),
    }
}

#[test]
fn missing_candidate_start_is_reported_not_defaulted() {
    let backend = backend();
    seed_registration(&backend, "act-b", "2023-12-01T00:00:00Z");
    let mut undated = activity("act-d", "", 2, "APPROVED");
    undated.start_period = None;
    backend
        .directory
        .upsert_activity(undated)
        .expect("directory writable");

    let verdict = evaluator(&backend).check(
        &ActivityId("act-d".to_string()),
        STUDENT_NRP,
        &token(STUDENT),
    );
    assert!(!verdict.eligible);
    assert_eq!(verdict.reason, EligibilityReason::InvalidActivityData);
}

#[test]
fn eligibility_check_is_limited_to_students() {
    let backend = backend();
    let service = build_service(&backend);

    let outcome = service.check_eligibility(&ActivityId("act-a".to_string()), &token(ADVISOR));
    assert!(matches!(outcome, Err(RegistrationServiceError::Unauthorized)));

    let unknown = service.check_eligibility(&ActivityId("act-a".to_string()), &token("nope"));
    assert!(matches!(unknown, Err(RegistrationServiceError::Unauthorized)));
}

#[test]
fn repository_outage_surfaces_as_unavailable_verdict() {
    let directory = MemoryDirectory::from_fixtures(fixtures());
    let evaluator = EligibilityEvaluator::new(
        Arc::new(UnavailableRepository),
        Arc::new(directory.clone()) as Arc<dyn ActivityLookup>,
    );

    let verdict = evaluator.check(
        &ActivityId("act-a".to_string()),
        STUDENT_NRP,
        &token(STUDENT),
    );
    assert!(!verdict.eligible);
    assert_eq!(verdict.reason, EligibilityReason::UpstreamUnavailable);
}
