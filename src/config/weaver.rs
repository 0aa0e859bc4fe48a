//! Weaver configuration.

use std::env;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Environment variable overriding [`WeaverConfig::max_threads`].
pub const ENV_MAX_THREADS: &str = "WEAVER_MAX_THREADS";
/// Environment variable overriding [`WeaverConfig::thread_stack_size`].
pub const ENV_THREAD_STACK_SIZE: &str = "WEAVER_THREAD_STACK_SIZE";
/// Environment variable overriding [`WeaverConfig::thread_name_prefix`].
pub const ENV_THREAD_NAME_PREFIX: &str = "WEAVER_THREAD_NAME_PREFIX";

const MIN_STACK_SIZE: usize = 64 * 1024;

/// Thread-inventory settings of a weaver.
///
/// Threads are never created up front: `max_threads` only bounds how many
/// the weaver grows to under load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    /// Upper bound of worker threads.
    pub max_threads: usize,
    /// Stack size for worker threads; platform default when `None`.
    pub thread_stack_size: Option<usize>,
    /// Worker threads are named `{prefix}-{worker_id}`.
    pub thread_name_prefix: String,
}

/// Default inventory bound: twice the CPU count, at least four.
#[must_use]
pub fn default_max_threads() -> usize {
    (2 * num_cpus::get()).max(4)
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            thread_stack_size: None,
            thread_name_prefix: "weaver".into(),
        }
    }
}

impl WeaverConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread inventory bound.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".into());
        }
        if let Some(size) = self.thread_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
            }
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment, loading `.env`
    /// first when present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a resulting invalid configuration.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, with the same rules
    /// as [`from_env`](Self::from_env).
    ///
    /// # Errors
    ///
    /// A value that does not parse, or a resulting invalid configuration.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(raw) = value(ENV_MAX_THREADS) {
            cfg.max_threads = raw
                .parse()
                .with_context(|| format!("{ENV_MAX_THREADS}={raw:?} is not a thread count"))?;
        }
        if let Some(raw) = value(ENV_THREAD_STACK_SIZE) {
            let size = raw
                .parse()
                .with_context(|| format!("{ENV_THREAD_STACK_SIZE}={raw:?} is not a byte size"))?;
            cfg.thread_stack_size = Some(size);
        }
        if let Some(prefix) = value(ENV_THREAD_NAME_PREFIX) {
            cfg.thread_name_prefix = prefix;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}
