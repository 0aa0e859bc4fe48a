//! Configuration models for weavers.

pub mod weaver;

pub use weaver::{
    default_max_threads, WeaverConfig, ENV_MAX_THREADS, ENV_THREAD_NAME_PREFIX,
    ENV_THREAD_STACK_SIZE,
};
