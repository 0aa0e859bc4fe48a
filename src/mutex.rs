//! Synchronization for data shared between jobs.
//!
//! The weaver never serializes `run()` bodies: jobs that append to one
//! buffer or bump one counter run in parallel and must guard that data
//! themselves. These are `parking_lot`'s types: no poisoning, so a job
//! that panics while holding the lock does not wedge its siblings.
//!
//! ```
//! use std::sync::Arc;
//! use prometheus_weaver::Mutex;
//! use prometheus_weaver::core::{JobCollection, JobHandle, Weaver};
//!
//! let out = Arc::new(Mutex::new(Vec::new()));
//! let collection = JobCollection::new();
//! for n in 0..4 {
//!     let out = Arc::clone(&out);
//!     collection.add_job(JobHandle::from_fn(move || out.lock().push(n))).unwrap();
//! }
//!
//! let weaver = Weaver::new();
//! weaver.enqueue(&collection).unwrap();
//! weaver.finish();
//!
//! let mut seen = out.lock().clone();
//! seen.sort_unstable();
//! assert_eq!(seen, vec![0, 1, 2, 3]);
//! ```

pub use parking_lot::{Mutex, MutexGuard};
