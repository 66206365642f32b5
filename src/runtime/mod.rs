//! Submission API and process control.

pub mod api;
pub mod process;

pub use api::{SubmitReceipt, TaskManager};
pub use process::{run_until, run_until_shutdown};
