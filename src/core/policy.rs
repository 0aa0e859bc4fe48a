//! Queue policies: admission hooks consulted before a job runs.
//!
//! A [`QueuePolicy`] is asked [`can_run`](QueuePolicy::can_run) immediately
//! before a worker starts a job. A granting answer must reserve whatever the
//! policy guards, atomically with the check. Every reservation is returned
//! through [`release`](QueuePolicy::release), which the engine calls
//! unconditionally when the job finishes, when it is dequeued before it
//! started, or when another policy declined the same admission attempt.
//!
//! A denied job stays pending and the worker moves on to the next eligible
//! job. To get the job re-examined, a denying policy keeps the
//! [`PolicyWaker`] it was handed and calls [`PolicyWaker::wake`] once
//! admission may succeed. [`WakerSet`] does the bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::signal::Signal;
use super::weaver::WeaverId;
use super::JobHandle;

/// Why a policy reservation is being returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// The job ran to completion (successfully or not).
    Finished,
    /// The job was withdrawn from the queue before it started.
    Dequeued,
    /// The job was granted by this policy but declined by another one.
    Declined,
}

/// Pluggable admission control for jobs.
///
/// Policies are shared (`Arc`) and may be referenced by jobs on unrelated
/// aggregates and weavers, so implementations synchronize their own state.
/// `can_run` is called while the weaver holds its scheduling lock: it must
/// not block and must not call back into a weaver.
pub trait QueuePolicy: Send + Sync {
    /// Decide whether `job` may start now, reserving capacity if it may.
    ///
    /// When denying, keep `waker` and wake it once the answer may change.
    fn can_run(&self, job: &JobHandle, waker: &PolicyWaker) -> bool;

    /// Return whatever [`can_run`](QueuePolicy::can_run) reserved for `job`.
    ///
    /// Called for every job carrying this policy, including jobs this policy
    /// never granted; such calls must be harmless.
    fn release(&self, job: &JobHandle, reason: ReleaseReason);
}

/// Handle that re-triggers scheduling on the weaver that was denied.
#[derive(Debug, Clone)]
pub struct PolicyWaker {
    weaver: WeaverId,
    signal: Weak<Signal>,
}

impl PolicyWaker {
    pub(crate) fn new(weaver: WeaverId, signal: &Arc<Signal>) -> Self {
        Self {
            weaver,
            signal: Arc::downgrade(signal),
        }
    }

    /// Identity of the weaver (or blocking caller) this waker belongs to.
    #[must_use]
    pub const fn weaver_id(&self) -> WeaverId {
        self.weaver
    }

    /// Ask the owning weaver to re-examine its pending jobs.
    ///
    /// Cheap and safe from any thread or lock context. Does nothing once the
    /// weaver is gone.
    pub fn wake(&self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.notify();
        }
    }
}

/// Wakers registered by denied admission attempts, one per weaver.
#[derive(Debug, Default)]
pub struct WakerSet {
    wakers: HashMap<WeaverId, PolicyWaker>,
}

impl WakerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `waker`; repeated denials from one weaver keep a single entry.
    pub fn register(&mut self, waker: &PolicyWaker) {
        self.wakers
            .entry(waker.weaver_id())
            .or_insert_with(|| waker.clone());
    }

    /// Number of distinct weavers waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wakers.len()
    }

    /// Whether nobody is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wakers.is_empty()
    }

    /// Drain the set. Call [`PolicyWaker::wake`] on the result after
    /// dropping the policy's own lock.
    pub fn take(&mut self) -> Vec<PolicyWaker> {
        self.wakers.drain().map(|(_, waker)| waker).collect()
    }
}

/// Wake every waker in `wakers`.
pub fn wake_all(wakers: Vec<PolicyWaker>) {
    for waker in wakers {
        waker.wake();
    }
}
