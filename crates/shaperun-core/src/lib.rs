//! shaperun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Child processes or pipes
//! - HTTP
//! - Runtime specifics
//!
//! Everything the worker, the pool and the gateway agree on lives here.

pub mod error;
pub mod ids;
pub mod params;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::{CoreError, ErrorKind, TaskError};
pub use ids::{TaskId, WorkerId};
pub use params::{ParamValue, Parameters};
pub use status::{TaskState, WorkerState};
pub use task::Task;
