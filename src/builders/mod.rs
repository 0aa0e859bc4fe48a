//! Builders to construct weavers from configuration.

pub mod weaver_builder;

pub use weaver_builder::{build_weaver_from_env, WeaverBuilder};
