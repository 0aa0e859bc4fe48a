//! Dependency policy: a job waits until the jobs it depends on finished.
//!
//! Edges are kept per dependent job. A dependent is admissible once all of
//! its dependees report [`JobStatus::Finished`](crate::core::JobStatus);
//! the dependee's release on completion wakes every weaver that was denied.
//!
//! Design:
//! - Forward edges only: dependent -> dependees it waits for
//! - Finished dependees are pruned lazily on every admission check
//! - Invariant: the graph stays acyclic, `add_dependency` rejects cycles

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::error::WeaverError;
use super::job::{JobHandle, JobId};
use super::policy::{wake_all, PolicyWaker, QueuePolicy, ReleaseReason, WakerSet};

/// Queue policy expressing "job A can only start after job B finished".
///
/// The policy keeps strong handles to dependees until they finish, so a
/// dependency on a job that never runs keeps that job alive.
#[derive(Debug, Default)]
pub struct DependencyPolicy {
    state: Mutex<Graph>,
}

#[derive(Debug, Default)]
struct Graph {
    edges: HashMap<JobId, Vec<JobHandle>>,
    waiting: WakerSet,
}

impl Graph {
    fn prune(&mut self, dependent: JobId) -> bool {
        let Some(dependees) = self.edges.get_mut(&dependent) else {
            return true;
        };
        dependees.retain(|dependee| !dependee.is_finished());
        if dependees.is_empty() {
            self.edges.remove(&dependent);
            true
        } else {
            false
        }
    }

    /// Whether `from` waits, directly or transitively, for `target`.
    fn reaches(&self, from: JobId, target: JobId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(dependees) = self.edges.get(&current) {
                stack.extend(dependees.iter().map(JobHandle::id));
            }
        }
        false
    }
}

impl DependencyPolicy {
    /// Create an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `dependent` wait until `dependee` finished.
    ///
    /// Assigns this policy to both jobs. A dependee that already finished
    /// adds nothing.
    ///
    /// # Errors
    ///
    /// [`WeaverError::DependencyCycle`] if `dependee` already waits for
    /// `dependent`, directly or transitively, or both are the same job.
    pub fn add_dependency(
        self: &Arc<Self>,
        dependent: &JobHandle,
        dependee: &JobHandle,
    ) -> Result<(), WeaverError> {
        {
            let mut graph = self.state.lock();
            if dependent == dependee || graph.reaches(dependee.id(), dependent.id()) {
                return Err(WeaverError::DependencyCycle {
                    dependent: dependent.id(),
                    dependee: dependee.id(),
                });
            }
            if dependee.is_finished() {
                return Ok(());
            }
            let dependees = graph.edges.entry(dependent.id()).or_default();
            if !dependees.contains(dependee) {
                dependees.push(dependee.clone());
            }
        }

        let policy: Arc<dyn QueuePolicy> = Arc::clone(self) as Arc<dyn QueuePolicy>;
        dependent.assign_queue_policy(Arc::clone(&policy));
        dependee.assign_queue_policy(policy);
        debug!(dependent = %dependent.id(), dependee = %dependee.id(), "dependency added");
        Ok(())
    }

    /// Drop the edge `dependent -> dependee`. Returns whether it existed.
    pub fn remove_dependency(&self, dependent: &JobHandle, dependee: &JobHandle) -> bool {
        let wakers = {
            let mut graph = self.state.lock();
            let Some(dependees) = graph.edges.get_mut(&dependent.id()) else {
                return false;
            };
            let before = dependees.len();
            dependees.retain(|d| d != dependee);
            if dependees.len() == before {
                return false;
            }
            if dependees.is_empty() {
                graph.edges.remove(&dependent.id());
            }
            graph.waiting.take()
        };
        wake_all(wakers);
        true
    }

    /// Whether `job` still waits for an unfinished dependee.
    #[must_use]
    pub fn has_unresolved_dependencies(&self, job: &JobHandle) -> bool {
        !self.state.lock().prune(job.id())
    }

    /// The unfinished jobs `job` waits for.
    #[must_use]
    pub fn dependencies_of(&self, job: &JobHandle) -> Vec<JobHandle> {
        let mut graph = self.state.lock();
        graph.prune(job.id());
        graph.edges.get(&job.id()).cloned().unwrap_or_default()
    }
}

impl QueuePolicy for DependencyPolicy {
    fn can_run(&self, job: &JobHandle, waker: &PolicyWaker) -> bool {
        let mut graph = self.state.lock();
        if graph.prune(job.id()) {
            true
        } else {
            graph.waiting.register(waker);
            false
        }
    }

    fn release(&self, job: &JobHandle, reason: ReleaseReason) {
        if reason != ReleaseReason::Finished {
            return;
        }
        let wakers = {
            let mut graph = self.state.lock();
            let mut resolved = false;
            graph.edges.retain(|_, dependees| {
                let before = dependees.len();
                dependees.retain(|d| d != job);
                resolved |= dependees.len() != before;
                !dependees.is_empty()
            });
            if resolved {
                graph.waiting.take()
            } else {
                Vec::new()
            }
        };
        wake_all(wakers);
    }
}
