//! Builders to construct the executor from configuration.

pub mod executor_builder;

pub use executor_builder::{build_store, ExecutorBuilder, SETTING_DAILY_TIME, SETTING_MAX_WORKERS};
