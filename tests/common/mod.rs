//! Shared test jobs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus_weaver::core::{Job, JobHandle};
use prometheus_weaver::Mutex;

/// Shared output buffer the test jobs append to.
pub type Output = Arc<Mutex<String>>;

pub fn output() -> Output {
    Arc::new(Mutex::new(String::new()))
}

/// Appends one character to a shared string; optionally reports failure.
pub struct AppendCharacter {
    pub c: char,
    pub out: Output,
    pub fail: bool,
}

impl Job for AppendCharacter {
    fn run(&self) {
        self.out.lock().push(self.c);
    }

    fn success(&self) -> bool {
        !self.fail
    }
}

pub fn append(c: char, out: &Output) -> JobHandle {
    JobHandle::new(AppendCharacter {
        c,
        out: Arc::clone(out),
        fail: false,
    })
}

pub fn failing_append(c: char, out: &Output) -> JobHandle {
    JobHandle::new(AppendCharacter {
        c,
        out: Arc::clone(out),
        fail: true,
    })
}

/// Tracks how many jobs run at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job that holds its slot for `hold` while counted as running.
    pub fn job(&self, hold: Duration) -> JobHandle {
        let gauge = self.clone();
        JobHandle::from_fn(move || {
            let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.max.fetch_max(now, Ordering::SeqCst);
            thread::sleep(hold);
            gauge.current.fetch_sub(1, Ordering::SeqCst);
            gauge.runs.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}
