//! Capacity-limiting queue policy.

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::job::{JobHandle, JobId};
use super::policy::{wake_all, PolicyWaker, QueuePolicy, ReleaseReason, WakerSet};

/// Limits how many jobs referencing this policy run at the same time.
///
/// The limit is system-wide: it holds across unrelated aggregates,
/// top-level enqueues and weavers. Jobs over the limit stay pending and are
/// woken as soon as a running job releases its slot, so every referencing
/// job is eventually admitted.
///
/// ```
/// use std::sync::Arc;
/// use prometheus_weaver::core::{JobHandle, ResourceRestrictionPolicy, Weaver};
///
/// let restriction = Arc::new(ResourceRestrictionPolicy::new(2));
/// let weaver = Weaver::new();
/// for _ in 0..7 {
///     let job = JobHandle::from_fn(|| {});
///     job.assign_queue_policy(restriction.clone());
///     weaver.enqueue(job).unwrap();
/// }
/// weaver.finish();
/// assert_eq!(restriction.in_use(), 0);
/// ```
#[derive(Debug)]
pub struct ResourceRestrictionPolicy {
    state: Mutex<Restriction>,
}

#[derive(Debug)]
struct Restriction {
    cap: usize,
    customers: Vec<JobId>,
    waiting: WakerSet,
}

impl ResourceRestrictionPolicy {
    /// Create a policy admitting at most `cap` concurrent jobs.
    ///
    /// A capacity of zero could never admit anything; it is raised to one.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            state: Mutex::new(Restriction {
                cap: clamp_cap(cap),
                customers: Vec::new(),
                waiting: WakerSet::new(),
            }),
        }
    }

    /// Current capacity.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.state.lock().cap
    }

    /// Change the capacity. Jobs already running keep their slot; raising
    /// the capacity wakes waiting weavers.
    pub fn set_cap(&self, cap: usize) {
        let wakers = {
            let mut state = self.state.lock();
            let cap = clamp_cap(cap);
            let raised = cap > state.cap;
            state.cap = cap;
            if raised {
                state.waiting.take()
            } else {
                Vec::new()
            }
        };
        wake_all(wakers);
    }

    /// Number of jobs currently holding a slot.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.state.lock().customers.len()
    }
}

fn clamp_cap(cap: usize) -> usize {
    if cap == 0 {
        warn!("resource restriction capacity 0 raised to 1");
        1
    } else {
        cap
    }
}

impl QueuePolicy for ResourceRestrictionPolicy {
    fn can_run(&self, job: &JobHandle, waker: &PolicyWaker) -> bool {
        let mut state = self.state.lock();
        if state.customers.contains(&job.id()) {
            return true;
        }
        if state.customers.len() < state.cap {
            state.customers.push(job.id());
            true
        } else {
            state.waiting.register(waker);
            debug!(job_id = %job.id(), cap = state.cap, "resource restriction denied admission");
            false
        }
    }

    fn release(&self, job: &JobHandle, _reason: ReleaseReason) {
        let wakers = {
            let mut state = self.state.lock();
            let Some(position) = state.customers.iter().position(|id| *id == job.id()) else {
                return;
            };
            state.customers.remove(position);
            state.waiting.take()
        };
        wake_all(wakers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signal::Signal;
    use crate::core::WeaverId;
    use std::sync::Arc;

    fn waker() -> (Arc<Signal>, PolicyWaker) {
        let signal = Arc::new(Signal::new());
        let waker = PolicyWaker::new(WeaverId::new(), &signal);
        (signal, waker)
    }

    #[test]
    fn test_grants_up_to_cap() {
        let (_signal, waker) = waker();
        let policy = ResourceRestrictionPolicy::new(2);
        let jobs: Vec<_> = (0..3).map(|_| JobHandle::from_fn(|| {})).collect();

        assert!(policy.can_run(&jobs[0], &waker));
        assert!(policy.can_run(&jobs[1], &waker));
        assert!(!policy.can_run(&jobs[2], &waker));
        assert_eq!(policy.in_use(), 2);

        // Asking again for a granted job does not take another slot.
        assert!(policy.can_run(&jobs[0], &waker));
        assert_eq!(policy.in_use(), 2);
    }

    #[test]
    fn test_release_wakes_denied_weaver() {
        let (signal, waker) = waker();
        let policy = ResourceRestrictionPolicy::new(1);
        let a = JobHandle::from_fn(|| {});
        let b = JobHandle::from_fn(|| {});

        assert!(policy.can_run(&a, &waker));
        assert!(!policy.can_run(&b, &waker));
        let before = signal.epoch();

        policy.release(&a, ReleaseReason::Finished);
        assert_ne!(signal.epoch(), before);
        assert!(policy.can_run(&b, &waker));
    }

    #[test]
    fn test_release_of_unknown_job_is_harmless() {
        let policy = ResourceRestrictionPolicy::new(1);
        policy.release(&JobHandle::from_fn(|| {}), ReleaseReason::Dequeued);
        assert_eq!(policy.in_use(), 0);
    }

    #[test]
    fn test_zero_cap_is_raised() {
        let policy = ResourceRestrictionPolicy::new(0);
        assert_eq!(policy.cap(), 1);
        policy.set_cap(3);
        assert_eq!(policy.cap(), 3);
    }
}
