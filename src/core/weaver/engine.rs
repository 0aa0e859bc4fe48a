//! Queue bookkeeping: scheduling, admission, completion and withdrawal.
//!
//! Everything here runs with the engine lock held.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use tracing::{debug, trace};

use super::{Shared, WeaverState};
use crate::core::job::{JobHandle, JobId, JobKind, JobStatus};
use crate::core::observer::Notice;
use crate::core::policy::{PolicyWaker, ReleaseReason};

/// Mutable engine state behind the weaver lock.
pub(super) struct Engine {
    /// Pending jobs in enqueue order.
    pub(super) queue: VecDeque<JobHandle>,
    /// Top-level jobs from enqueue until they finish or are withdrawn.
    /// Children only hold a weak link to their owner; this keeps it alive.
    pub(super) roots: HashMap<JobId, JobHandle>,
    pub(super) running: usize,
    pub(super) threads: usize,
    pub(super) idle: usize,
    pub(super) max_threads: usize,
    pub(super) next_worker_id: usize,
    pub(super) state: WeaverState,
    pub(super) handles: Vec<JoinHandle<()>>,
    /// Events waiting for delivery to observers.
    pub(super) notices: Vec<Notice>,
    /// Handles whose last drop must happen outside the lock.
    pub(super) retired: Vec<JobHandle>,
    /// Flushes currently delivering notices with the lock released.
    pub(super) dispatching: usize,
}

impl Engine {
    pub(super) fn new(max_threads: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            roots: HashMap::new(),
            running: 0,
            threads: 0,
            idle: 0,
            max_threads,
            next_worker_id: 0,
            state: WeaverState::WorkingHard,
            handles: Vec::new(),
            notices: Vec::new(),
            retired: Vec::new(),
            dispatching: 0,
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.running == 0
    }

    /// Empty, and every notice about finished work has been delivered.
    pub(super) fn is_settled(&self) -> bool {
        self.is_empty() && self.notices.is_empty() && self.dispatching == 0
    }

    fn retire_root(&mut self, id: JobId) {
        if let Some(root) = self.roots.remove(&id) {
            self.retired.push(root);
        }
    }
}

/// What withdrawing a job subtree left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Withdrawal {
    /// Never scheduled.
    Idle,
    /// Scheduled but not started; back to unscheduled.
    Reset,
    /// Something in the subtree is running.
    InFlight,
    /// Finished, possibly just now.
    Done,
}

enum Step {
    Wait,
    Schedule(JobHandle),
    Complete,
}

impl Shared {
    /// Make `job` pending. Aggregates wait in the queue as one item and are
    /// opened when a worker takes them; an empty one without policies has
    /// nothing to wait for and finishes on the spot.
    pub(super) fn schedule(&self, engine: &mut Engine, job: JobHandle) {
        if job.is_aggregate() && job.child_count() == 0 && job.queue_policy_count() == 0 {
            self.expand(engine, &job);
        } else {
            job.core().status = JobStatus::Queued;
            trace!(weaver_id = %self.id, job_id = %job.id(), "job queued");
            engine.queue.push_back(job);
        }
    }

    /// Start an aggregate: schedule its initially eligible children.
    fn expand(&self, engine: &mut Engine, aggregate: &JobHandle) {
        let eligible = {
            let mut core = aggregate.core();
            core.status = JobStatus::Running;
            core.cursor = 0;
            core.halted = false;
            core.failed = false;
            match aggregate.kind() {
                JobKind::Collection => {
                    core.remaining = core.children.len();
                    core.children.clone()
                }
                JobKind::Sequence => core.children.first().cloned().into_iter().collect(),
                JobKind::Work => Vec::new(),
            }
        };
        debug!(
            weaver_id = %self.id,
            job_id = %aggregate.id(),
            kind = ?aggregate.kind(),
            eligible = eligible.len(),
            "aggregate started"
        );
        engine.notices.push(Notice::Started(aggregate.clone()));

        if eligible.is_empty() {
            self.complete(engine, aggregate);
        } else {
            for child in eligible {
                self.schedule(engine, child);
            }
        }
    }

    /// Take the first queued plain job every policy admits. Admitted
    /// aggregates are opened on the way and the scan continues.
    pub(super) fn take_next(&self, engine: &mut Engine, waker: &PolicyWaker) -> Option<JobHandle> {
        let mut index = 0;
        while index < engine.queue.len() {
            let candidate = engine.queue[index].clone();
            if !candidate.admit(waker) {
                trace!(weaver_id = %self.id, job_id = %candidate.id(), "admission denied");
                index += 1;
                continue;
            }
            engine.queue.remove(index);
            if candidate.is_aggregate() {
                self.expand(engine, &candidate);
                continue;
            }
            candidate.core().status = JobStatus::Running;
            engine.running += 1;
            return Some(candidate);
        }
        None
    }

    /// Book the end of a plain job's `run`.
    pub(super) fn job_done(&self, engine: &mut Engine, job: &JobHandle, success: bool) {
        job.core().outcome = Some(success);
        engine.running -= 1;
        let counter = if success {
            &self.counters.completed
        } else {
            &self.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.complete(engine, job);
        if engine.state == WeaverState::Suspending && engine.running == 0 {
            self.set_state(engine, WeaverState::Suspended);
        }
        // Completion may have queued a successor or released a policy slot.
        self.signal.notify();
        self.settle(engine);
    }

    /// Mark `job` finished, release its policies and notify its owner.
    fn complete(&self, engine: &mut Engine, job: &JobHandle) {
        job.core().status = JobStatus::Finished;
        job.release_policies(ReleaseReason::Finished);
        debug!(weaver_id = %self.id, job_id = %job.id(), success = job.success(), "job finished");
        engine.notices.push(Notice::Done(job.clone()));

        match job.owner() {
            Some(owner) => self.child_finished(engine, &owner, job),
            None => engine.retire_root(job.id()),
        }
    }

    fn child_finished(&self, engine: &mut Engine, aggregate: &JobHandle, child: &JobHandle) {
        let child_success = child.success();
        let step = {
            let mut core = aggregate.core();
            match aggregate.kind() {
                JobKind::Collection => {
                    core.remaining = core.remaining.saturating_sub(1);
                    if core.remaining == 0 {
                        Step::Complete
                    } else {
                        Step::Wait
                    }
                }
                JobKind::Sequence => {
                    if !child_success {
                        core.failed = true;
                        core.halted = true;
                    }
                    if core.halted {
                        Step::Complete
                    } else {
                        core.cursor += 1;
                        core.children
                            .get(core.cursor)
                            .cloned()
                            .map_or(Step::Complete, Step::Schedule)
                    }
                }
                JobKind::Work => Step::Wait,
            }
        };

        match step {
            Step::Wait => {}
            Step::Schedule(next) => self.schedule(engine, next),
            Step::Complete => self.complete(engine, aggregate),
        }
    }

    /// Withdraw the subtree of top-level `job` enqueued on this weaver.
    /// Returns how many queued jobs were removed.
    pub(super) fn withdraw(&self, engine: &mut Engine, job: &JobHandle) -> usize {
        // Only jobs this weaver still tracks; another weaver's queue is off limits.
        if engine.roots.get(&job.id()) != Some(job) {
            debug!(weaver_id = %self.id, job_id = %job.id(), "job not pending on this weaver, nothing withdrawn");
            return 0;
        }
        let mut removed = 0;
        let outcome = self.withdraw_tree(engine, job, &mut removed);
        if matches!(outcome, Withdrawal::Reset | Withdrawal::Done) {
            engine.retire_root(job.id());
        }
        if removed > 0 {
            debug!(weaver_id = %self.id, job_id = %job.id(), removed, ?outcome, "job withdrawn");
            self.counters.dequeued.fetch_add(removed as u64, Ordering::Relaxed);
        }
        self.settle(engine);
        removed
    }

    /// Withdraw every top-level job that has not started.
    pub(super) fn withdraw_all(&self, engine: &mut Engine) -> usize {
        let roots: Vec<JobHandle> = engine.roots.values().cloned().collect();
        roots.iter().map(|root| self.withdraw(engine, root)).sum()
    }

    fn withdraw_tree(&self, engine: &mut Engine, job: &JobHandle, removed: &mut usize) -> Withdrawal {
        match job.status() {
            JobStatus::Unscheduled => Withdrawal::Idle,
            JobStatus::Finished => Withdrawal::Done,
            JobStatus::Queued => {
                engine.queue.retain(|queued| queued != job);
                job.core().status = JobStatus::Unscheduled;
                job.release_policies(ReleaseReason::Dequeued);
                *removed += 1;
                Withdrawal::Reset
            }
            JobStatus::Running if job.is_aggregate() => self.halt(engine, job, removed),
            JobStatus::Running => Withdrawal::InFlight,
        }
    }

    /// Withdraw the children of a running aggregate. Without any started
    /// child the aggregate is reset; otherwise it is halted and finishes,
    /// failed, once its running children are done.
    fn halt(&self, engine: &mut Engine, aggregate: &JobHandle, removed: &mut usize) -> Withdrawal {
        let mut in_flight = 0;
        let mut started = false;
        for child in aggregate.children() {
            match self.withdraw_tree(engine, &child, removed) {
                Withdrawal::Idle | Withdrawal::Reset => {}
                Withdrawal::InFlight => {
                    in_flight += 1;
                    started = true;
                }
                Withdrawal::Done => started = true,
            }
        }

        if !started {
            {
                let mut core = aggregate.core();
                core.status = JobStatus::Unscheduled;
                core.cursor = 0;
                core.remaining = 0;
                core.halted = false;
                core.failed = false;
            }
            aggregate.release_policies(ReleaseReason::Dequeued);
            return Withdrawal::Reset;
        }

        {
            let mut core = aggregate.core();
            core.halted = true;
            core.failed = true;
            core.remaining = in_flight;
        }
        debug!(weaver_id = %self.id, job_id = %aggregate.id(), in_flight, "aggregate halted");
        if in_flight > 0 {
            return Withdrawal::InFlight;
        }

        // Nothing left to wait for. The owner, if any, is being withdrawn in
        // the same pass and accounts for this subtree as done.
        aggregate.core().status = JobStatus::Finished;
        aggregate.release_policies(ReleaseReason::Finished);
        engine.notices.push(Notice::Done(aggregate.clone()));
        Withdrawal::Done
    }
}
