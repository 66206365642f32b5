//! Configuration models for the executor and its store backend.

pub mod executor;

pub use executor::{parse_daily_time, ExecutorConfig, StoreBackendConfig};
