//! Fluent construction of weavers.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;

use crate::config::WeaverConfig;
use crate::core::{AppResult, Weaver, WeaverError, WeaverObserver};

/// Assembles a [`Weaver`] from configuration plus observers.
///
/// ```
/// use prometheus_weaver::builders::WeaverBuilder;
///
/// let weaver = WeaverBuilder::new()
///     .max_threads(2)
///     .thread_name_prefix("render")
///     .build()
///     .unwrap();
/// assert_eq!(weaver.maximum_number_of_threads(), 2);
/// ```
#[derive(Default)]
pub struct WeaverBuilder {
    config: WeaverConfig,
    observers: Vec<Arc<dyn WeaverObserver>>,
}

impl WeaverBuilder {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `config`.
    #[must_use]
    pub fn from_config(config: WeaverConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
        }
    }

    /// Bound the thread inventory.
    #[must_use]
    pub const fn max_threads(mut self, max_threads: usize) -> Self {
        self.config.max_threads = max_threads;
        self
    }

    /// Worker stack size in bytes.
    #[must_use]
    pub const fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.config.thread_stack_size = Some(bytes);
        self
    }

    /// Worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Register an observer on the built weaver.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn WeaverObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate the configuration and create the weaver. No thread is
    /// started until work arrives.
    ///
    /// # Errors
    ///
    /// [`WeaverError::InvalidConfig`] if the configuration does not validate.
    pub fn build(self) -> Result<Weaver, WeaverError> {
        let weaver = Weaver::with_config(self.config)?;
        for observer in self.observers {
            weaver.add_observer(observer);
        }
        Ok(weaver)
    }
}

impl fmt::Debug for WeaverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeaverBuilder")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Build a weaver configured from the environment (and `.env`).
///
/// # Errors
///
/// Invalid environment values or configuration.
pub fn build_weaver_from_env() -> AppResult<Weaver> {
    let config = WeaverConfig::from_env()?;
    WeaverBuilder::from_config(config)
        .build()
        .context("building weaver from environment")
}
