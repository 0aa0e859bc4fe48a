//! The weaver: a lazily grown thread pool executing queued jobs.
//!
//! A [`Weaver`] owns a FIFO queue of pending jobs and an inventory of worker
//! threads. It starts with zero threads and spawns one whenever queued work
//! outnumbers idle workers, up to the configured maximum. Idle workers pull
//! the first queued job whose queue policies all admit it; a denied job stays
//! pending and the worker moves on to the next one, so one throttled job
//! never stalls the pool.
//!
//! Aggregates join the queue as one item and are opened when a worker takes
//! them: a collection queues all its children, a sequence only the child at
//! its cursor. Completion flows
//! upward: a finishing job releases its policies, then notifies its owner,
//! which schedules the next eligible child or finishes itself.
//!
//! # Design
//!
//! - One engine lock guards the queue, the counters and the thread inventory
//! - Lock order: engine, then queue policy, then job state; the wake signal
//!   is a leaf lock taken last
//! - Observers and the final drop of retired jobs run with the lock released
//! - No polling: idle workers sleep on an epoch signal bumped by every event
//!   that can make a queued job admissible

mod engine;
mod worker;

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WeaverConfig;

use self::engine::Engine;
use super::error::WeaverError;
use super::job::JobHandle;
use super::observer::{Notice, WeaverObserver};
use super::signal::Signal;

/// How long `shutdown` waits for each worker thread before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Identity of a weaver, used in logs and to key policy wakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeaverId(Uuid);

impl WeaverId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WeaverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WeaverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a weaver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaverState {
    /// Handing queued jobs to workers.
    WorkingHard,
    /// Suspended while jobs are still running.
    Suspending,
    /// Suspended with no job running.
    Suspended,
    /// Draining; new jobs are rejected.
    ShuttingDown,
    /// Shut down; worker threads are gone.
    Destructed,
}

impl WeaverState {
    /// Whether `suspend` is in effect.
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::Suspending | Self::Suspended)
    }

    /// Whether shutdown started.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Destructed)
    }

    /// Whether workers may start queued jobs.
    #[must_use]
    pub const fn accepts_work(self) -> bool {
        matches!(self, Self::WorkingHard | Self::ShuttingDown)
    }
}

/// Point-in-time statistics of a weaver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaverStats {
    /// Worker threads in the inventory.
    pub threads: usize,
    /// Workers not executing a job.
    pub idle_threads: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Jobs currently executing.
    pub running: usize,
    /// Top-level `enqueue` calls accepted.
    pub enqueued: u64,
    /// Plain jobs that finished successfully.
    pub completed: u64,
    /// Plain jobs that finished with failure (including panics).
    pub failed: u64,
    /// Queued jobs withdrawn by `dequeue`/`dequeue_all`.
    pub dequeued: u64,
}

/// Lifetime counters (lock-free atomics).
#[derive(Debug, Default)]
struct WeaverCounters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dequeued: AtomicU64,
}

impl WeaverCounters {
    fn snapshot(&self, engine: &Engine) -> WeaverStats {
        WeaverStats {
            threads: engine.threads,
            idle_threads: engine.idle,
            queued: engine.queue.len(),
            running: engine.running,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the weaver handle and its worker threads.
struct Shared {
    id: WeaverId,
    config: WeaverConfig,
    engine: Mutex<Engine>,
    /// Notified whenever the engine may have become settled.
    settled: Condvar,
    signal: Arc<Signal>,
    counters: WeaverCounters,
    observers: RwLock<Vec<Arc<dyn WeaverObserver>>>,
}

impl Shared {
    fn set_state(&self, engine: &mut Engine, state: WeaverState) {
        if engine.state != state {
            info!(weaver_id = %self.id, from = ?engine.state, to = ?state, "weaver state changed");
            engine.state = state;
            engine.notices.push(Notice::State(state));
        }
    }

    fn settle(&self, engine: &Engine) {
        if engine.is_settled() {
            self.settled.notify_all();
        }
    }

    /// Deliver pending notices and drop retired jobs with the lock released.
    fn flush(&self, engine: &mut MutexGuard<'_, Engine>) {
        if engine.notices.is_empty() && engine.retired.is_empty() {
            return;
        }
        let notices = mem::take(&mut engine.notices);
        let retired = mem::take(&mut engine.retired);
        let observers = self.observers.read().clone();

        engine.dispatching += 1;
        MutexGuard::unlocked(engine, move || {
            worker::delivering(self.id, || {
                for notice in &notices {
                    for observer in &observers {
                        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                            notice.deliver(self.id, observer.as_ref());
                        }));
                        if delivered.is_err() {
                            error!(weaver_id = %self.id, "observer panicked");
                        }
                    }
                }
            });
            drop(notices);
            drop(retired);
        });
        engine.dispatching -= 1;
        self.settle(engine);
    }

    fn wait_settled(&self) {
        let mut engine = self.engine.lock();
        if engine.state.is_suspended() && !engine.queue.is_empty() {
            warn!(
                weaver_id = %self.id,
                queued = engine.queue.len(),
                "finish() on a suspended weaver waits until resume()"
            );
        }
        while !engine.is_settled() {
            self.settled.wait(&mut engine);
        }
    }
}

/// A job-execution engine with a lazily grown thread pool.
///
/// ```
/// use std::sync::Arc;
/// use prometheus_weaver::Mutex;
/// use prometheus_weaver::core::{JobHandle, Weaver};
///
/// let out = Arc::new(Mutex::new(String::new()));
/// let weaver = Weaver::new();
/// assert_eq!(weaver.thread_count(), 0);
///
/// let job = {
///     let out = Arc::clone(&out);
///     JobHandle::from_fn(move || out.lock().push('1'))
/// };
/// weaver.enqueue(&job).unwrap();
/// weaver.finish();
///
/// assert_eq!(*out.lock(), "1");
/// assert!(job.is_finished());
/// assert!(weaver.is_empty());
/// ```
pub struct Weaver {
    shared: Arc<Shared>,
}

impl Weaver {
    /// Create a weaver with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_valid_config(WeaverConfig::default())
    }

    /// Create a weaver from `config`.
    ///
    /// # Errors
    ///
    /// [`WeaverError::InvalidConfig`] if the configuration does not validate.
    pub fn with_config(config: WeaverConfig) -> Result<Self, WeaverError> {
        config.validate().map_err(WeaverError::InvalidConfig)?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: WeaverConfig) -> Self {
        let id = WeaverId::new();
        let engine = Engine::new(config.max_threads);
        info!(
            weaver_id = %id,
            max_threads = config.max_threads,
            "weaver initialized, threads are created on demand"
        );
        Self {
            shared: Arc::new(Shared {
                id,
                config,
                engine: Mutex::new(engine),
                settled: Condvar::new(),
                signal: Arc::new(Signal::new()),
                counters: WeaverCounters::default(),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The process-wide weaver, created on first use and never shut down.
    #[must_use]
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<Weaver> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    /// This weaver's identity.
    #[must_use]
    pub fn id(&self) -> WeaverId {
        self.shared.id
    }

    /// The configuration this weaver was created with.
    #[must_use]
    pub fn config(&self) -> &WeaverConfig {
        &self.shared.config
    }

    /// Register an observer for job, thread and state events.
    pub fn add_observer(&self, observer: Arc<dyn WeaverObserver>) {
        self.shared.observers.write().push(observer);
    }

    /// Queue a top-level job or aggregate.
    ///
    /// An aggregate is queued as one item and opened by the first worker
    /// that takes it; an empty aggregate finishes right away. Spawns worker
    /// threads as needed. Callable from any thread, including from inside a
    /// running job.
    ///
    /// # Errors
    ///
    /// - [`WeaverError::ShuttingDown`] after `shutdown` started
    /// - [`WeaverError::OwnedByAggregate`] for a child of an aggregate
    /// - [`WeaverError::AlreadyScheduled`] / [`WeaverError::AlreadyFinished`]
    ///   unless the job is unscheduled
    /// - [`WeaverError::ThreadSpawn`] if no worker thread exists and none
    ///   could be created; the job is withdrawn again
    pub fn enqueue(&self, job: impl Into<JobHandle>) -> Result<(), WeaverError> {
        let job = job.into();
        let shared = &self.shared;
        let mut engine = shared.engine.lock();
        if engine.state.is_shutting_down() {
            warn!(weaver_id = %shared.id, job_id = %job.id(), "enqueue rejected, weaver is shutting down");
            return Err(WeaverError::ShuttingDown);
        }
        job.claim()?;

        debug!(weaver_id = %shared.id, job_id = %job.id(), kind = ?job.kind(), "job enqueued");
        shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        engine.roots.insert(job.id(), job.clone());
        shared.schedule(&mut engine, job.clone());

        if let Err(err) = worker::adjust_inventory(shared, &mut engine) {
            shared.withdraw(&mut engine, &job);
            shared.flush(&mut engine);
            return Err(err);
        }
        shared.signal.notify();
        shared.settle(&engine);
        shared.flush(&mut engine);
        Ok(())
    }

    /// Withdraw a top-level job enqueued on this weaver that has not started.
    ///
    /// Aggregates are withdrawn recursively. One whose children have not
    /// started returns to unscheduled and can be enqueued again; a partially
    /// started aggregate is halted instead: running children finish, nothing
    /// else starts, and it finishes with `success() == false`. Running jobs
    /// are never interrupted. Safe while suspended.
    ///
    /// Returns whether any queued job was removed. Jobs owned by an aggregate
    /// are rejected with a warning and `false`; jobs pending on another
    /// weaver are left alone and also give `false`.
    pub fn dequeue(&self, job: &JobHandle) -> bool {
        if let Some(owner) = job.owner() {
            warn!(
                weaver_id = %self.shared.id,
                job_id = %job.id(),
                owner_id = %owner.id(),
                "dequeue of a job owned by an aggregate ignored, dequeue the aggregate"
            );
            return false;
        }
        let mut engine = self.shared.engine.lock();
        let removed = self.shared.withdraw(&mut engine, job);
        self.shared.flush(&mut engine);
        removed > 0
    }

    /// Withdraw every job that has not started. Running jobs complete
    /// normally.
    pub fn dequeue_all(&self) {
        let mut engine = self.shared.engine.lock();
        let removed = self.shared.withdraw_all(&mut engine);
        debug!(weaver_id = %self.shared.id, removed, "queue cleared");
        self.shared.flush(&mut engine);
    }

    /// Stop handing queued jobs to workers. Running jobs are not interrupted.
    pub fn suspend(&self) {
        let mut engine = self.shared.engine.lock();
        if engine.state != WeaverState::WorkingHard {
            return;
        }
        let next = if engine.running == 0 {
            WeaverState::Suspended
        } else {
            WeaverState::Suspending
        };
        self.shared.set_state(&mut engine, next);
        self.shared.flush(&mut engine);
    }

    /// Undo [`suspend`](Self::suspend).
    pub fn resume(&self) {
        let mut engine = self.shared.engine.lock();
        if !engine.state.is_suspended() {
            return;
        }
        self.shared.set_state(&mut engine, WeaverState::WorkingHard);
        if let Err(err) = worker::adjust_inventory(&self.shared, &mut engine) {
            warn!(weaver_id = %self.shared.id, error = %err, "resume could not grow the thread inventory");
        }
        self.shared.signal.notify();
        self.shared.flush(&mut engine);
    }

    /// Block until the queue is empty and no job is running.
    ///
    /// Returns immediately when already empty. Calling it from one of this
    /// weaver's own worker threads, or from an observer callback of this
    /// weaver, would never return; it logs a warning and returns instead. On a suspended weaver with queued jobs it blocks
    /// until another thread calls [`resume`](Self::resume).
    pub fn finish(&self) {
        if worker::blocks_own_progress(self.shared.id) {
            warn!(weaver_id = %self.shared.id, "finish() called from a worker or observer of the same weaver, not waiting");
            return;
        }
        self.shared.wait_settled();
        debug!(weaver_id = %self.shared.id, "weaver finished");
    }

    /// Like [`finish`](Self::finish) but gives up after `timeout`. Returns
    /// whether the weaver is empty.
    #[must_use]
    pub fn finish_timeout(&self, timeout: Duration) -> bool {
        if worker::blocks_own_progress(self.shared.id) {
            warn!(weaver_id = %self.shared.id, "finish_timeout() called from a worker or observer of the same weaver, not waiting");
            return self.is_empty();
        }
        let deadline = Instant::now() + timeout;
        let mut engine = self.shared.engine.lock();
        while !engine.is_settled() {
            if self.shared.settled.wait_until(&mut engine, deadline).timed_out() {
                return engine.is_settled();
            }
        }
        true
    }

    /// Async [`finish`](Self::finish): waits on tokio's blocking pool so the
    /// calling runtime keeps running.
    #[cfg(feature = "tokio-runtime")]
    pub async fn finish_async(&self) {
        let shared = Arc::clone(&self.shared);
        if let Err(err) = tokio::task::spawn_blocking(move || shared.wait_settled()).await {
            error!(weaver_id = %self.shared.id, error = %err, "finish_async wait failed");
        }
    }

    /// Whether the queue is empty and no job is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.engine.lock().is_empty()
    }

    /// Whether the weaver is empty and every worker thread is idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let engine = self.shared.engine.lock();
        engine.is_empty() && engine.idle == engine.threads
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.shared.engine.lock().queue.len()
    }

    /// Number of worker threads. Zero until work first arrives.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.shared.engine.lock().threads
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WeaverState {
        self.shared.engine.lock().state
    }

    /// Snapshot of inventory and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> WeaverStats {
        let engine = self.shared.engine.lock();
        self.shared.counters.snapshot(&engine)
    }

    /// Upper bound of the thread inventory.
    #[must_use]
    pub fn maximum_number_of_threads(&self) -> usize {
        self.shared.engine.lock().max_threads
    }

    /// Change the inventory bound. Excess threads retire once idle. Zero is
    /// raised to one.
    pub fn set_maximum_number_of_threads(&self, max_threads: usize) {
        let max_threads = if max_threads == 0 {
            warn!(weaver_id = %self.shared.id, "maximum number of threads 0 raised to 1");
            1
        } else {
            max_threads
        };
        let mut engine = self.shared.engine.lock();
        engine.max_threads = max_threads;
        if let Err(err) = worker::adjust_inventory(&self.shared, &mut engine) {
            warn!(weaver_id = %self.shared.id, error = %err, "could not grow the thread inventory");
        }
        self.shared.signal.notify();
        self.shared.flush(&mut engine);
    }

    /// Finish outstanding work, then stop and join the worker threads.
    ///
    /// A suspended weaver is resumed first so queued work can drain. Each
    /// worker gets a bounded time to exit and is detached after that.
    /// Further `enqueue` calls fail with [`WeaverError::ShuttingDown`].
    pub fn shutdown(&self) {
        if worker::blocks_own_progress(self.shared.id) {
            warn!(weaver_id = %self.shared.id, "shutdown() called from a worker or observer of the same weaver, ignored");
            return;
        }
        if self.state().is_shutting_down() {
            return;
        }
        self.resume();
        self.finish();

        let handles = {
            let mut engine = self.shared.engine.lock();
            if engine.state.is_shutting_down() {
                return;
            }
            self.shared.set_state(&mut engine, WeaverState::ShuttingDown);
            self.shared.flush(&mut engine);
            mem::take(&mut engine.handles)
        };
        self.shared.signal.notify();

        let worker_count = handles.len();
        info!(weaver_id = %self.shared.id, worker_count, "shutting down weaver");
        for handle in handles {
            join_with_timeout(self.shared.id, handle, JOIN_TIMEOUT);
        }

        let mut engine = self.shared.engine.lock();
        self.shared.set_state(&mut engine, WeaverState::Destructed);
        self.shared.flush(&mut engine);
        info!(weaver_id = %self.shared.id, worker_count, "weaver shut down complete");
    }
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Weaver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weaver")
            .field("id", &self.shared.id)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for Weaver {
    fn drop(&mut self) {
        // Pending work is withdrawn and workers are detached, not joined.
        // Explicit shutdown() is required for a graceful drain.
        let mut engine = self.shared.engine.lock();
        if engine.state.is_shutting_down() {
            return;
        }
        self.shared.set_state(&mut engine, WeaverState::ShuttingDown);
        let withdrawn = self.shared.withdraw_all(&mut engine);
        debug!(
            weaver_id = %self.shared.id,
            withdrawn,
            "weaver dropped without explicit shutdown, workers will be detached"
        );
        self.shared.signal.notify();
        self.shared.flush(&mut engine);
    }
}

/// Join `handle`, giving up after `timeout`.
fn join_with_timeout(weaver_id: WeaverId, handle: JoinHandle<()>, timeout: Duration) {
    let name = handle.thread().name().unwrap_or("worker").to_owned();
    let (tx, rx) = bounded(1);
    let joiner = thread::spawn(move || {
        let _ = tx.send(handle.join().is_ok());
    });

    match rx.recv_timeout(timeout) {
        Ok(true) => debug!(weaver_id = %weaver_id, thread = %name, "worker joined"),
        Ok(false) => warn!(weaver_id = %weaver_id, thread = %name, "worker panicked"),
        Err(_) => {
            warn!(weaver_id = %weaver_id, thread = %name, "worker did not exit within timeout, detaching");
            return;
        }
    }
    let _ = joiner.join();
}
