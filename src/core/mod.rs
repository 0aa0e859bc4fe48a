//! Jobs, aggregates, queue policies and the weaver that runs them.

pub mod collection;
pub mod dependency;
pub mod error;
pub mod job;
pub mod observer;
pub mod policy;
pub mod resource_restriction;
pub mod sequence;
pub(crate) mod signal;
pub mod weaver;

pub use collection::JobCollection;
pub use dependency::DependencyPolicy;
pub use error::{AppResult, WeaverError};
pub use job::{Job, JobHandle, JobId, JobKind, JobStatus, Lambda};
pub use observer::WeaverObserver;
pub use policy::{wake_all, PolicyWaker, QueuePolicy, ReleaseReason, WakerSet};
pub use resource_restriction::ResourceRestrictionPolicy;
pub use sequence::JobSequence;
pub use weaver::{Weaver, WeaverId, WeaverState, WeaverStats};
