//! Jobs: the schedulable units of work.
//!
//! Client code implements [`Job`] for its work and wraps it in a
//! [`JobHandle`], the reference-counted unit the engine schedules. Handles
//! are cheap to clone and compare by identity. Aggregates
//! ([`JobCollection`](crate::core::JobCollection) and
//! [`JobSequence`](crate::core::JobSequence)) are handles too, so they nest
//! and are enqueued, dequeued and inspected exactly like plain jobs.
//!
//! # Lifecycle
//!
//! ```text
//! Unscheduled --enqueue--> Queued --admitted--> Running --run() returns--> Finished
//!      ^                     |
//!      +------dequeue--------+
//! ```
//!
//! The engine never serializes `run()` bodies. Jobs that touch shared data
//! synchronize it themselves, for example with [`crate::Mutex`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::error::WeaverError;
use super::policy::{PolicyWaker, QueuePolicy, ReleaseReason};
use super::signal::Signal;
use super::weaver::WeaverId;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique job identifier, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Build an id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created (or dequeued) and not known to any weaver.
    Unscheduled,
    /// Pending in a weaver queue, waiting for a worker and admission.
    Queued,
    /// Executing; for aggregates, children are being scheduled.
    Running,
    /// Done. A finished job never runs again.
    Finished,
}

/// What a handle schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A client [`Job`].
    Work,
    /// Independent children, unordered.
    Collection,
    /// Ordered children with stop-on-failure.
    Sequence,
}

/// A unit of client work.
///
/// `run` is executed on a worker thread. Failure is reported as a value
/// through `success`; a panic escaping `run` is caught by the worker and
/// recorded as a failure.
pub trait Job: Send + Sync + 'static {
    /// Perform the work.
    fn run(&self);

    /// Whether the work succeeded. Queried after `run` returns.
    fn success(&self) -> bool {
        true
    }
}

impl<J: Job + ?Sized> Job for Arc<J> {
    fn run(&self) {
        (**self).run();
    }

    fn success(&self) -> bool {
        (**self).success()
    }
}

impl<J: Job + ?Sized> Job for Box<J> {
    fn run(&self) {
        (**self).run();
    }

    fn success(&self) -> bool {
        (**self).success()
    }
}

/// A job that calls a closure. Always succeeds unless the closure panics.
pub struct Lambda<F> {
    func: F,
}

impl<F> Lambda<F>
where
    F: Fn() + Send + Sync + 'static,
{
    /// Wrap `func`.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Job for Lambda<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn run(&self) {
        (self.func)();
    }
}

pub(crate) enum Body {
    Work(Box<dyn Job>),
    Collection,
    Sequence,
}

/// Mutable scheduling state of one job. Transitions happen under the owning
/// weaver's lock; this mutex only makes the state shareable.
pub(crate) struct JobCore {
    pub(crate) status: JobStatus,
    pub(crate) parent: Weak<JobInner>,
    pub(crate) policies: Vec<Arc<dyn QueuePolicy>>,
    pub(crate) children: Vec<JobHandle>,
    /// Sequence: index of the child currently scheduled.
    pub(crate) cursor: usize,
    /// Collection: children that have not finished yet.
    pub(crate) remaining: usize,
    /// Aggregate stops scheduling children.
    pub(crate) halted: bool,
    /// Aggregate outcome is failure.
    pub(crate) failed: bool,
    /// Leaf outcome captured when `run` returned.
    pub(crate) outcome: Option<bool>,
}

pub(crate) struct JobInner {
    id: JobId,
    body: Body,
    core: Mutex<JobCore>,
}

/// Shared, cloneable reference to a schedulable job.
///
/// Equality and hashing follow identity: two handles are equal when they
/// refer to the same job.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

impl JobHandle {
    /// Wrap client work in a schedulable handle.
    pub fn new<J: Job>(job: J) -> Self {
        Self::with_body(Body::Work(Box::new(job)))
    }

    /// Wrap a closure. Shorthand for `JobHandle::new(Lambda::new(func))`.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(Lambda::new(func))
    }

    pub(crate) fn collection() -> Self {
        Self::with_body(Body::Collection)
    }

    pub(crate) fn sequence() -> Self {
        Self::with_body(Body::Sequence)
    }

    fn with_body(body: Body) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: JobId::next(),
                body,
                core: Mutex::new(JobCore {
                    status: JobStatus::Unscheduled,
                    parent: Weak::new(),
                    policies: Vec::new(),
                    children: Vec::new(),
                    cursor: 0,
                    remaining: 0,
                    halted: false,
                    failed: false,
                    outcome: None,
                }),
            }),
        }
    }

    /// This job's identifier.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// What this handle schedules.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self.inner.body {
            Body::Work(_) => JobKind::Work,
            Body::Collection => JobKind::Collection,
            Body::Sequence => JobKind::Sequence,
        }
    }

    /// Whether this is a collection or a sequence.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        !matches!(self.inner.body, Body::Work(_))
    }

    /// Current scheduling state.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.core().status
    }

    /// True once the job ran and reconciled with its owner and policies.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status() == JobStatus::Finished
    }

    /// Outcome of the job.
    ///
    /// Plain jobs report their own [`Job::success`] (false if `run`
    /// panicked). A sequence fails when a child failed; any aggregate fails
    /// when it was dequeued after some of its children had started.
    /// Defaults to `true` before the job ran.
    #[must_use]
    pub fn success(&self) -> bool {
        match &self.inner.body {
            Body::Work(job) => {
                let outcome = self.core().outcome;
                outcome.unwrap_or_else(|| job.success())
            }
            Body::Collection | Body::Sequence => !self.core().failed,
        }
    }

    /// Attach a policy that must admit this job before it starts.
    ///
    /// The policy is shared, not owned. Assigning the same instance twice has
    /// no effect. Policies on an aggregate admit the aggregate as a whole
    /// before any of its children becomes eligible and are held until it
    /// finishes.
    pub fn assign_queue_policy(&self, policy: Arc<dyn QueuePolicy>) {
        let mut core = self.core();
        if !core.policies.iter().any(|p| same_policy(p, &policy)) {
            core.policies.push(policy);
        }
    }

    /// Detach a policy. Returns whether it was assigned.
    pub fn remove_queue_policy(&self, policy: &Arc<dyn QueuePolicy>) -> bool {
        let mut core = self.core();
        let before = core.policies.len();
        core.policies.retain(|p| !same_policy(p, policy));
        core.policies.len() != before
    }

    /// Number of policies assigned.
    #[must_use]
    pub fn queue_policy_count(&self) -> usize {
        self.core().policies.len()
    }

    /// The aggregate owning this job, if any.
    #[must_use]
    pub fn owner(&self) -> Option<Self> {
        self.core().parent.upgrade().map(|inner| Self { inner })
    }

    /// Run this job on the calling thread, bypassing any weaver.
    ///
    /// Sequences keep their order and stop at the first failure; collection
    /// children run one after another. Queue policies are honoured: the
    /// caller parks until every policy admits the job.
    ///
    /// # Errors
    ///
    /// Same rules as [`Weaver::enqueue`](crate::core::Weaver::enqueue): the
    /// job must be unscheduled and not owned by an aggregate.
    pub fn blocking_execute(&self) -> Result<(), WeaverError> {
        self.claim()?;
        let signal = Arc::new(Signal::new());
        let waker = PolicyWaker::new(WeaverId::new(), &signal);
        let success = self.execute_inline(&signal, &waker);
        debug!(job_id = %self.id(), success, "blocking execution finished");
        Ok(())
    }

    fn execute_inline(&self, signal: &Signal, waker: &PolicyWaker) -> bool {
        loop {
            let seen = signal.epoch();
            if self.admit(waker) {
                break;
            }
            signal.wait_past(seen);
        }
        self.core().status = JobStatus::Running;

        let success = match &self.inner.body {
            Body::Work(_) => {
                let success = self.run_work();
                self.core().outcome = Some(success);
                success
            }
            Body::Collection => {
                for child in self.children() {
                    child.execute_inline(signal, waker);
                }
                true
            }
            Body::Sequence => {
                let children = self.children();
                let success = children.iter().all(|child| child.execute_inline(signal, waker));
                self.core().failed = !success;
                success
            }
        };

        self.core().status = JobStatus::Finished;
        self.release_policies(ReleaseReason::Finished);
        success
    }

    /// Run client work, converting a panic into failure.
    pub(crate) fn run_work(&self) -> bool {
        let Body::Work(job) = &self.inner.body else {
            return true;
        };
        panic::catch_unwind(AssertUnwindSafe(|| {
            job.run();
            job.success()
        }))
        .unwrap_or_else(|_| {
            error!(job_id = %self.id(), "job panicked while running");
            false
        })
    }

    /// Ask every assigned policy for admission; on denial, hand back what
    /// was already granted.
    pub(crate) fn admit(&self, waker: &PolicyWaker) -> bool {
        let policies = self.policies();
        for (index, policy) in policies.iter().enumerate() {
            if !policy.can_run(self, waker) {
                for granted in policies[..index].iter().rev() {
                    granted.release(self, ReleaseReason::Declined);
                }
                return false;
            }
        }
        true
    }

    pub(crate) fn release_policies(&self, reason: ReleaseReason) {
        for policy in self.policies() {
            policy.release(self, reason);
        }
    }

    /// Atomically move a top-level, unscheduled job to `Queued`.
    pub(crate) fn claim(&self) -> Result<(), WeaverError> {
        let mut core = self.core();
        if let Some(owner) = core.parent.upgrade() {
            return Err(WeaverError::OwnedByAggregate(self.id(), owner.id));
        }
        match core.status {
            JobStatus::Unscheduled => {
                core.status = JobStatus::Queued;
                Ok(())
            }
            JobStatus::Finished => Err(WeaverError::AlreadyFinished(self.id())),
            JobStatus::Queued | JobStatus::Running => Err(WeaverError::AlreadyScheduled(self.id())),
        }
    }

    /// Append `child` to this aggregate.
    pub(crate) fn add_child(&self, child: Self) -> Result<(), WeaverError> {
        if !self.is_aggregate() {
            return Err(WeaverError::NotAnAggregate(self.id()));
        }
        if child == *self || self.has_ancestor(&child) {
            return Err(WeaverError::AggregateCycle {
                aggregate: self.id(),
                child: child.id(),
            });
        }

        let mut core = self.core();
        if core.status != JobStatus::Unscheduled {
            return Err(WeaverError::AggregateSealed(self.id()));
        }
        {
            let mut child_core = child.core();
            if let Some(owner) = child_core.parent.upgrade() {
                return Err(WeaverError::OwnedByAggregate(child.id(), owner.id));
            }
            match child_core.status {
                JobStatus::Unscheduled => {}
                JobStatus::Finished => return Err(WeaverError::AlreadyFinished(child.id())),
                JobStatus::Queued | JobStatus::Running => {
                    return Err(WeaverError::AlreadyScheduled(child.id()));
                }
            }
            child_core.parent = Arc::downgrade(&self.inner);
        }
        core.children.push(child);
        Ok(())
    }

    fn has_ancestor(&self, candidate: &Self) -> bool {
        let mut current = self.owner();
        while let Some(ancestor) = current {
            if ancestor == *candidate {
                return true;
            }
            current = ancestor.owner();
        }
        false
    }

    pub(crate) fn core(&self) -> MutexGuard<'_, JobCore> {
        self.inner.core.lock()
    }

    pub(crate) fn children(&self) -> Vec<Self> {
        self.core().children.clone()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.core().children.len()
    }

    pub(crate) fn child_at(&self, index: usize) -> Option<Self> {
        self.core().children.get(index).cloned()
    }

    pub(crate) fn policies(&self) -> Vec<Arc<dyn QueuePolicy>> {
        self.core().policies.clone()
    }
}

fn same_policy(a: &Arc<dyn QueuePolicy>, b: &Arc<dyn QueuePolicy>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for JobHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for JobHandle {}

impl Hash for JobHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("status", &self.status())
            .finish()
    }
}

impl From<&JobHandle> for JobHandle {
    fn from(handle: &JobHandle) -> Self {
        handle.clone()
    }
}
