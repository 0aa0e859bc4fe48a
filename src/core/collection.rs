//! Collections of independent jobs.

use std::ops::Deref;

use super::error::WeaverError;
use super::job::{JobHandle, JobKind};

/// An aggregate of independent child jobs.
///
/// When the collection is scheduled all children become eligible at once and
/// may run in parallel, bounded only by free workers and their own queue
/// policies. The collection finishes once every child finished, whatever
/// the individual outcomes: a failing child never stops its siblings. An
/// empty collection finishes as soon as it is enqueued.
///
/// Collections are jobs themselves (`Deref<Target = JobHandle>`) and can be
/// nested in other collections or sequences.
///
/// ```
/// use prometheus_weaver::core::{JobCollection, JobHandle, Weaver};
///
/// let weaver = Weaver::new();
/// let collection = JobCollection::new();
/// collection.add_job(JobHandle::from_fn(|| {})).unwrap();
/// collection.add_job(JobHandle::from_fn(|| {})).unwrap();
///
/// weaver.enqueue(&collection).unwrap();
/// weaver.finish();
/// assert!(collection.is_finished());
/// ```
#[derive(Debug, Clone)]
pub struct JobCollection {
    handle: JobHandle,
}

impl JobCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: JobHandle::collection(),
        }
    }

    /// Add a child. Must happen before the collection is scheduled.
    ///
    /// # Errors
    ///
    /// - [`WeaverError::AggregateSealed`] once the collection was scheduled
    /// - [`WeaverError::OwnedByAggregate`] if the child already has an owner
    /// - [`WeaverError::AlreadyScheduled`] / [`WeaverError::AlreadyFinished`]
    ///   if the child is not unscheduled
    /// - [`WeaverError::AggregateCycle`] if the child contains this collection
    pub fn add_job(&self, job: impl Into<JobHandle>) -> Result<(), WeaverError> {
        self.handle.add_child(job.into())
    }

    /// Number of children.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.handle.child_count()
    }

    /// Child at `index`, in insertion order.
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

impl Default for JobCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for JobCollection {
    type Target = JobHandle;

    fn deref(&self) -> &JobHandle {
        &self.handle
    }
}

impl From<JobCollection> for JobHandle {
    fn from(collection: JobCollection) -> Self {
        collection.handle
    }
}

impl From<&JobCollection> for JobHandle {
    fn from(collection: &JobCollection) -> Self {
        collection.handle.clone()
    }
}

impl TryFrom<JobHandle> for JobCollection {
    type Error = JobHandle;

    /// Recover the collection view of a handle; gives the handle back if it
    /// is not a collection.
    fn try_from(handle: JobHandle) -> Result<Self, JobHandle> {
        if handle.kind() == JobKind::Collection {
            Ok(Self { handle })
        } else {
            Err(handle)
        }
    }
}
