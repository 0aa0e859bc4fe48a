//! Integration tests for queue policies
//!
//! - Resource restriction shared by unrelated job trees and weavers
//! - Dependencies between top-level jobs and aggregates
//! - Policies assigned to aggregates

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{append, output, ConcurrencyGauge};
use prometheus_weaver::core::{
    DependencyPolicy, JobCollection, JobSequence, QueuePolicy, ResourceRestrictionPolicy, Weaver,
    WeaverError,
};

// ============================================================================
// RESOURCE RESTRICTION
// ============================================================================

#[test]
fn test_restriction_holds_across_weavers() {
    println!("\n=== test_restriction_holds_across_weavers ===");

    let first = Weaver::new();
    let second = Weaver::new();
    let restriction = Arc::new(ResourceRestrictionPolicy::new(1));
    let gauge = ConcurrencyGauge::new();

    for weaver in [&first, &second] {
        for _ in 0..3 {
            let job = gauge.job(Duration::from_millis(15));
            job.assign_queue_policy(restriction.clone());
            weaver.enqueue(job).expect("enqueue");
        }
    }
    first.finish();
    second.finish();

    println!("Max concurrent jobs: {}", gauge.max_concurrent());
    assert_eq!(gauge.runs(), 6);
    assert_eq!(gauge.max_concurrent(), 1);
    assert_eq!(restriction.in_use(), 0);

    println!("=== test_restriction_holds_across_weavers PASSED ===\n");
}

#[test]
fn test_restriction_across_aggregates() {
    let weaver = Weaver::new();
    let restriction = Arc::new(ResourceRestrictionPolicy::new(2));
    let gauge = ConcurrencyGauge::new();

    let collection = JobCollection::new();
    let sequence = JobSequence::new();
    for index in 0..8 {
        let job = gauge.job(Duration::from_millis(10));
        job.assign_queue_policy(restriction.clone());
        if index % 2 == 0 {
            collection.add_job(job).expect("add_job");
        } else {
            weaver.enqueue(job).expect("enqueue");
        }
    }
    let tail = gauge.job(Duration::from_millis(10));
    tail.assign_queue_policy(restriction.clone());
    sequence.add_job(tail).expect("add_job");

    weaver.enqueue(&collection).expect("enqueue");
    weaver.enqueue(&sequence).expect("enqueue");
    weaver.finish();

    assert_eq!(gauge.runs(), 9);
    assert!(gauge.max_concurrent() <= 2);
}

#[test]
fn test_restriction_on_aggregate_admits_it_as_a_whole() {
    let weaver = Weaver::new();
    let restriction = Arc::new(ResourceRestrictionPolicy::new(1));
    let out = output();

    let first = JobSequence::new();
    let second = JobSequence::new();
    for (sequence, chars) in [(&first, "ab"), (&second, "cd")] {
        for c in chars.chars() {
            sequence.add_job(append(c, &out)).expect("add_job");
        }
        sequence.assign_queue_policy(restriction.clone());
    }

    weaver.enqueue(&first).expect("enqueue");
    weaver.enqueue(&second).expect("enqueue");
    weaver.finish();

    // One sequence holds the slot until it finished, so they never interleave.
    let result = out.lock().clone();
    assert!(result == "abcd" || result == "cdab", "interleaved: {result}");
    assert_eq!(restriction.in_use(), 0);
}

#[test]
fn test_removed_policy_no_longer_applies() {
    let restriction = Arc::new(ResourceRestrictionPolicy::new(1));
    let policy: Arc<dyn QueuePolicy> = restriction.clone();
    let out = output();
    let job = append('a', &out);

    job.assign_queue_policy(Arc::clone(&policy));
    job.assign_queue_policy(Arc::clone(&policy));
    assert_eq!(job.queue_policy_count(), 1);

    assert!(job.remove_queue_policy(&policy));
    assert!(!job.remove_queue_policy(&policy));
    assert_eq!(job.queue_policy_count(), 0);
}

// ============================================================================
// DEPENDENCIES
// ============================================================================

#[test]
fn test_dependencies_order_top_level_jobs() {
    println!("\n=== test_dependencies_order_top_level_jobs ===");

    let weaver = Weaver::new();
    let dependencies = Arc::new(DependencyPolicy::new());
    let out = output();
    let first = append('1', &out);
    let second = append('2', &out);
    let third = append('3', &out);

    dependencies.add_dependency(&first, &second).expect("dependency");
    dependencies.add_dependency(&second, &third).expect("dependency");
    assert!(matches!(
        dependencies.add_dependency(&third, &first),
        Err(WeaverError::DependencyCycle { .. })
    ));

    for job in [&first, &second, &third] {
        weaver.enqueue(job).expect("enqueue");
    }
    weaver.finish();

    assert_eq!(*out.lock(), "321");
    assert!(!dependencies.has_unresolved_dependencies(&first));

    println!("=== test_dependencies_order_top_level_jobs PASSED ===\n");
}

#[test]
fn test_collection_dependency() {
    println!("\n=== test_collection_dependency ===");

    let weaver = Weaver::new();
    let dependencies = Arc::new(DependencyPolicy::new());
    let out = output();

    let collection = JobCollection::new();
    for c in ['a', 'b'] {
        collection.add_job(append(c, &out)).expect("add_job");
    }
    let job_c = append('c', &out);
    dependencies
        .add_dependency(&collection, &job_c)
        .expect("dependency");

    weaver.enqueue(&collection).expect("enqueue");
    weaver.enqueue(&job_c).expect("enqueue");
    weaver.finish();

    let result = out.lock().clone();
    println!("Result: {result}");
    assert_eq!(result.len(), 3);
    assert!(result.starts_with('c'));
    assert!(collection.is_finished());

    println!("=== test_collection_dependency PASSED ===\n");
}

#[test]
fn test_incomplete_collection_waits_for_dependency() {
    let weaver = Weaver::new();
    let dependencies = Arc::new(DependencyPolicy::new());
    let out = output();

    let job_a = append('a', &out);
    let job_b = append('b', &out);
    let collection = JobCollection::new();
    collection.add_job(&job_a).expect("add_job");
    dependencies.add_dependency(&job_a, &job_b).expect("dependency");

    weaver.enqueue(&collection).expect("enqueue");
    // job_b is never queued, so the collection cannot finish.
    assert!(!weaver.finish_timeout(Duration::from_millis(100)));
    assert!(!collection.is_finished());
    assert_eq!(dependencies.dependencies_of(&job_a), vec![job_b.clone()]);

    assert!(dependencies.remove_dependency(&job_a, &job_b));
    weaver.finish();

    assert_eq!(*out.lock(), "a");
    assert!(collection.is_finished());
}

#[test]
fn test_dependency_on_finished_job_is_ignored() {
    let weaver = Weaver::new();
    let dependencies = Arc::new(DependencyPolicy::new());
    let out = output();
    let done = append('a', &out);
    weaver.enqueue(&done).expect("enqueue");
    weaver.finish();

    let job = append('b', &out);
    dependencies.add_dependency(&job, &done).expect("dependency");
    assert!(!dependencies.has_unresolved_dependencies(&job));

    weaver.enqueue(&job).expect("enqueue");
    weaver.finish();
    assert_eq!(*out.lock(), "ab");
}
