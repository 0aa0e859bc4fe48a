//! Error types for weaver operations.

use thiserror::Error;

use super::JobId;

/// Errors produced when the engine rejects a request.
///
/// Job-reported failure is never an error: it is observed through
/// [`JobHandle::success`](crate::core::JobHandle::success).
#[derive(Debug, Error)]
pub enum WeaverError {
    /// The job is already queued or running.
    #[error("job {0} is already scheduled")]
    AlreadyScheduled(JobId),
    /// The job has finished and can not run again.
    #[error("job {0} has already finished")]
    AlreadyFinished(JobId),
    /// The job belongs to an aggregate and is scheduled through it.
    #[error("job {0} is owned by aggregate {1}")]
    OwnedByAggregate(JobId, JobId),
    /// The aggregate can not be modified once it has been scheduled.
    #[error("aggregate {0} can not be modified after it was scheduled")]
    AggregateSealed(JobId),
    /// The target of `add_job` is a plain job, not a collection or sequence.
    #[error("job {0} is not an aggregate")]
    NotAnAggregate(JobId),
    /// Adding the child would make an aggregate contain itself.
    #[error("adding job {child} to aggregate {aggregate} would create a cycle")]
    AggregateCycle {
        /// The aggregate receiving the child.
        aggregate: JobId,
        /// The rejected child.
        child: JobId,
    },
    /// The dependency would close a cycle and never resolve.
    #[error("dependency of job {dependent} on job {dependee} would create a cycle")]
    DependencyCycle {
        /// The job that would wait.
        dependent: JobId,
        /// The job it would wait for.
        dependee: JobId,
    },
    /// The weaver is shutting down and accepts no more work.
    #[error("weaver is shutting down")]
    ShuttingDown,
    /// A worker thread could not be created and no worker is available.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
