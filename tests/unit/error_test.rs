//! Tests for error types

use prometheus_weaver::core::{JobId, WeaverError};

#[test]
fn test_already_scheduled_error() {
    let err = WeaverError::AlreadyScheduled(JobId::from_raw(5));
    assert_eq!(format!("{}", err), "job #5 is already scheduled");
}

#[test]
fn test_owned_by_aggregate_error() {
    let err = WeaverError::OwnedByAggregate(JobId::from_raw(2), JobId::from_raw(1));
    assert_eq!(format!("{}", err), "job #2 is owned by aggregate #1");
}

#[test]
fn test_sealed_aggregate_error() {
    let err = WeaverError::AggregateSealed(JobId::from_raw(9));
    assert_eq!(
        format!("{}", err),
        "aggregate #9 can not be modified after it was scheduled"
    );
}

#[test]
fn test_dependency_cycle_error() {
    let err = WeaverError::DependencyCycle {
        dependent: JobId::from_raw(3),
        dependee: JobId::from_raw(4),
    };
    assert_eq!(
        format!("{}", err),
        "dependency of job #3 on job #4 would create a cycle"
    );
}

#[test]
fn test_shutting_down_error() {
    assert_eq!(
        format!("{}", WeaverError::ShuttingDown),
        "weaver is shutting down"
    );
}

#[test]
fn test_errors_convert_into_anyhow() {
    let result: prometheus_weaver::core::AppResult<()> =
        Err(WeaverError::InvalidConfig("max_threads must be greater than 0".into()).into());
    let err = result.unwrap_err();
    assert!(err.to_string().contains("max_threads"));
    assert!(err.downcast_ref::<WeaverError>().is_some());
}
