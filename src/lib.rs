//! # Prometheus Weaver
//!
//! A job-execution engine: a managed, lazily grown thread pool that runs
//! units of work while respecting ordering (sequences), grouping
//! (collections) and shared-resource admission control (queue policies).
//!
//! ## Core Problem Solved
//!
//! Applications that fan work out to threads need more than a bare pool:
//!
//! - **Ordering**: some steps must run strictly one after another and stop
//!   at the first failure
//! - **Grouping**: independent steps run in parallel and are awaited as one
//! - **Throttling**: a scarce resource (a disk, a device, a connection
//!   budget) bounds how many jobs touching it run at once, across unrelated
//!   job trees and even across weavers
//!
//! ## Key Features
//!
//! - **Lazy Thread Pool**: zero threads at construction, grown on demand up
//!   to a configurable maximum
//! - **Composable Jobs**: [`JobCollection`](core::JobCollection) and
//!   [`JobSequence`](core::JobSequence) are jobs themselves and nest freely
//! - **Queue Policies**: [`ResourceRestrictionPolicy`](core::ResourceRestrictionPolicy)
//!   caps concurrency, [`DependencyPolicy`](core::DependencyPolicy) orders
//!   unrelated jobs; denied jobs never block a worker
//! - **Control**: suspend, resume, dequeue of not-yet-started work, finish,
//!   graceful shutdown
//! - **Observability**: structured `tracing` events and
//!   [`WeaverObserver`](core::WeaverObserver) hooks
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use prometheus_weaver::Mutex;
//! use prometheus_weaver::core::{Job, JobHandle, JobSequence, Weaver};
//!
//! struct Append {
//!     c: char,
//!     out: Arc<Mutex<String>>,
//! }
//!
//! impl Job for Append {
//!     fn run(&self) {
//!         self.out.lock().push(self.c);
//!     }
//! }
//!
//! let out = Arc::new(Mutex::new(String::new()));
//! let sequence = JobSequence::new();
//! for c in ['a', 'b', 'c'] {
//!     let job = JobHandle::new(Append { c, out: Arc::clone(&out) });
//!     sequence.add_job(job).unwrap();
//! }
//!
//! let weaver = Weaver::new();
//! weaver.enqueue(&sequence).unwrap();
//! weaver.finish();
//! assert_eq!(*out.lock(), "abc");
//! ```
//!
//! For complete scenarios, see `tests/job_tests.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Jobs, aggregates, queue policies and the weaver.
pub mod core;
/// Configuration models for weavers.
pub mod config;
/// Builders to construct weavers from configuration.
pub mod builders;
/// Synchronization for client data shared between jobs.
pub mod mutex;
/// Shared utilities.
pub mod util;

pub use mutex::{Mutex, MutexGuard};
