//! Observer hooks for weaver activity.

use super::job::JobHandle;
use super::weaver::{WeaverId, WeaverState};

/// Receives notifications about jobs, threads and state changes.
///
/// All methods default to no-ops. They are called on the thread that caused
/// the event (a worker, or the caller of `enqueue`/`dequeue`/...) after the
/// weaver released its internal lock, so they may call back into the weaver.
/// From inside a callback, `finish` and `finish_timeout` do not wait and
/// `shutdown` is ignored.
/// [`Weaver::finish`](crate::core::Weaver::finish) does not return before
/// every notification about the finished work was delivered.
pub trait WeaverObserver: Send + Sync {
    /// A job (or an aggregate) started.
    fn job_started(&self, _weaver: WeaverId, _job: &JobHandle) {}

    /// A job (or an aggregate) finished.
    fn job_done(&self, _weaver: WeaverId, _job: &JobHandle) {}

    /// The weaver moved to `state`.
    fn state_changed(&self, _weaver: WeaverId, _state: WeaverState) {}

    /// Worker thread `worker_id` was created.
    fn thread_started(&self, _weaver: WeaverId, _worker_id: usize) {}

    /// Worker thread `worker_id` left the inventory.
    fn thread_exited(&self, _weaver: WeaverId, _worker_id: usize) {}
}

/// Event captured under the weaver lock, delivered to observers after it
/// is released.
#[derive(Debug, Clone)]
pub(crate) enum Notice {
    Started(JobHandle),
    Done(JobHandle),
    State(WeaverState),
    ThreadStarted(usize),
    ThreadExited(usize),
}

impl Notice {
    pub(crate) fn deliver(&self, weaver: WeaverId, observer: &dyn WeaverObserver) {
        match self {
            Self::Started(job) => observer.job_started(weaver, job),
            Self::Done(job) => observer.job_done(weaver, job),
            Self::State(state) => observer.state_changed(weaver, *state),
            Self::ThreadStarted(worker_id) => observer.thread_started(weaver, *worker_id),
            Self::ThreadExited(worker_id) => observer.thread_exited(weaver, *worker_id),
        }
    }
}
