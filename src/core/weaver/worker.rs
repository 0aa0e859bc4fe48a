//! Worker threads: inventory growth and the worker loop.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::thread;

use parking_lot::MutexGuard;
use tracing::{debug, error};

use super::engine::Engine;
use super::{Shared, WeaverId, WeaverState};
use crate::core::error::WeaverError;
use crate::core::observer::Notice;
use crate::core::policy::PolicyWaker;

thread_local! {
    static CURRENT_WEAVER: Cell<Option<WeaverId>> = const { Cell::new(None) };
    /// Weavers whose notices this thread is delivering, innermost last.
    static DELIVERING: RefCell<Vec<WeaverId>> = const { RefCell::new(Vec::new()) };
}

/// Whether waiting for `weaver` to settle would wait on this very thread:
/// it is one of the weaver's workers, or it is delivering its notices.
pub(super) fn blocks_own_progress(weaver: WeaverId) -> bool {
    CURRENT_WEAVER.with(Cell::get) == Some(weaver)
        || DELIVERING.with(|delivering| delivering.borrow().contains(&weaver))
}

/// Run `deliver` with this thread marked as delivering notices of `weaver`.
pub(super) fn delivering<R>(weaver: WeaverId, deliver: impl FnOnce() -> R) -> R {
    DELIVERING.with(|delivering| delivering.borrow_mut().push(weaver));
    let result = deliver();
    DELIVERING.with(|delivering| {
        delivering.borrow_mut().pop();
    });
    result
}

/// Spawn workers while queued jobs outnumber idle ones, up to the bound.
///
/// A failed spawn is logged and ends growth. It is an error only when the
/// weaver is left without any thread to run the queue.
pub(super) fn adjust_inventory(shared: &Arc<Shared>, engine: &mut Engine) -> Result<(), WeaverError> {
    if engine.state != WeaverState::WorkingHard {
        return Ok(());
    }
    while engine.idle < engine.queue.len() && engine.threads < engine.max_threads {
        if let Err(err) = spawn_worker(shared, engine) {
            error!(
                weaver_id = %shared.id,
                threads = engine.threads,
                error = %err,
                "failed to spawn worker thread"
            );
            if engine.threads == 0 {
                return Err(WeaverError::ThreadSpawn(err));
            }
            break;
        }
    }
    Ok(())
}

fn spawn_worker(shared: &Arc<Shared>, engine: &mut Engine) -> std::io::Result<()> {
    let worker_id = engine.next_worker_id;
    let mut builder =
        thread::Builder::new().name(format!("{}-{worker_id}", shared.config.thread_name_prefix));
    if let Some(stack_size) = shared.config.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    let worker_shared = Arc::clone(shared);
    let handle = builder.spawn(move || run_worker(&worker_shared, worker_id))?;

    // Threads retired by a lowered maximum have exited; forget them.
    engine.handles.retain(|handle| !handle.is_finished());
    engine.next_worker_id += 1;
    engine.threads += 1;
    engine.idle += 1;
    engine.handles.push(handle);
    engine.notices.push(Notice::ThreadStarted(worker_id));
    debug!(weaver_id = %shared.id, worker_id, threads = engine.threads, "worker thread spawned");
    Ok(())
}

fn run_worker(shared: &Arc<Shared>, worker_id: usize) {
    CURRENT_WEAVER.with(|current| current.set(Some(shared.id)));
    let waker = PolicyWaker::new(shared.id, &shared.signal);
    debug!(weaver_id = %shared.id, worker_id, "worker thread started");

    let mut engine = shared.engine.lock();
    loop {
        // Read before scanning so a wake during the scan is not lost.
        let seen = shared.signal.epoch();

        let draining = engine.state.is_shutting_down() && engine.queue.is_empty();
        if draining || engine.threads > engine.max_threads {
            engine.threads -= 1;
            engine.idle -= 1;
            engine.notices.push(Notice::ThreadExited(worker_id));
            break;
        }

        let next = if engine.state.accepts_work() {
            shared.take_next(&mut engine, &waker)
        } else {
            None
        };
        if next.is_some() {
            engine.idle -= 1;
        }
        // Opening an aggregate may have queued more work than idle workers.
        if let Err(err) = adjust_inventory(shared, &mut engine) {
            debug!(weaver_id = %shared.id, worker_id, error = %err, "inventory not grown");
        }

        match next {
            Some(job) => {
                engine.notices.push(Notice::Started(job.clone()));
                shared.flush(&mut engine);

                debug!(weaver_id = %shared.id, worker_id, job_id = %job.id(), "worker executing job");
                let success = MutexGuard::unlocked(&mut engine, || job.run_work());

                shared.job_done(&mut engine, &job, success);
                engine.idle += 1;
                shared.flush(&mut engine);
                // The last handle may own client state; never drop it locked.
                MutexGuard::unlocked(&mut engine, move || drop(job));
            }
            None if !engine.notices.is_empty() || !engine.retired.is_empty() => {
                shared.flush(&mut engine);
            }
            None => MutexGuard::unlocked(&mut engine, || shared.signal.wait_past(seen)),
        }
    }

    shared.flush(&mut engine);
    drop(engine);
    debug!(weaver_id = %shared.id, worker_id, "worker thread exiting");
}
