//! Sequences: ordered chains of jobs with stop-on-failure.

use std::ops::Deref;

use super::error::WeaverError;
use super::job::{JobHandle, JobKind};

/// An aggregate of child jobs executed in strict order.
///
/// Only the first child is eligible when the sequence is scheduled. Child
/// `i + 1` becomes eligible after child `i` finished successfully, so two
/// children of one sequence never run at the same time. The first failing
/// child halts the sequence: later children are never scheduled and the
/// sequence finishes with `success() == false`.
///
/// ```
/// use std::sync::Arc;
/// use prometheus_weaver::Mutex;
/// use prometheus_weaver::core::{JobHandle, JobSequence, Weaver};
///
/// let out = Arc::new(Mutex::new(String::new()));
/// let sequence = JobSequence::new();
/// for c in ['a', 'b', 'c'] {
///     let out = Arc::clone(&out);
///     sequence.add_job(JobHandle::from_fn(move || out.lock().push(c))).unwrap();
/// }
///
/// let weaver = Weaver::new();
/// weaver.enqueue(&sequence).unwrap();
/// weaver.finish();
/// assert_eq!(*out.lock(), "abc");
/// ```
#[derive(Debug, Clone)]
pub struct JobSequence {
    handle: JobHandle,
}

impl JobSequence {
    /// Create an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: JobHandle::sequence(),
        }
    }

    /// Append a child to the chain. Must happen before the sequence is
    /// scheduled; fails under the same rules as
    /// [`JobCollection::add_job`](crate::core::JobCollection::add_job).
    ///
    /// # Errors
    ///
    /// Returns a [`WeaverError`] when the sequence is sealed or the child
    /// can not be adopted.
    pub fn add_job(&self, job: impl Into<JobHandle>) -> Result<(), WeaverError> {
        self.handle.add_child(job.into())
    }

    /// Number of children.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.handle.child_count()
    }

    /// Child at `index` in execution order.
    #[must_use]
    pub fn job_at(&self, index: usize) -> Option<JobHandle> {
        self.handle.child_at(index)
    }

    /// The underlying handle.
    #[must_use]
    pub const fn handle(&self) -> &JobHandle {
        &self.handle
    }
}

impl Default for JobSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for JobSequence {
    type Target = JobHandle;

    fn deref(&self) -> &JobHandle {
        &self.handle
    }
}

impl From<JobSequence> for JobHandle {
    fn from(sequence: JobSequence) -> Self {
        sequence.handle
    }
}

impl From<&JobSequence> for JobHandle {
    fn from(sequence: &JobSequence) -> Self {
        sequence.handle.clone()
    }
}

impl TryFrom<JobHandle> for JobSequence {
    type Error = JobHandle;

    fn try_from(handle: JobHandle) -> Result<Self, JobHandle> {
        if handle.kind() == JobKind::Sequence {
            Ok(Self { handle })
        } else {
            Err(handle)
        }
    }
}
