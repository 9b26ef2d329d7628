//! shaperun Gateway Library
//!
//! HTTP front of the worker pool: validates requests, runs each script as
//! one task through a [`TaskRunner`](shaperun_pool::TaskRunner) and answers
//! with the artifact bytes or the captured error detail.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod reaper;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::GatewayError;
pub use state::AppState;
