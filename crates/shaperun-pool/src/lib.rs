//! shaperun worker pool.
//!
//! The pool keeps up to `capacity` `shaperun-worker` processes alive, hands
//! each materialized task to exactly one idle worker, and replaces workers
//! that crash, hang or break the protocol.
//!
//! - [`Workspace`]: per-task input files, artifacts and error sidecars
//! - [`Supervisor`]: worker processes and their lifecycle
//! - [`Dispatcher`]: the [`TaskRunner`] the gateway talks to
//!
//! A task is never retried. A failed task is reported with its
//! [`ErrorKind`](shaperun_core::ErrorKind) and the worker behind it is
//! discarded if it died.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod process;
pub mod supervisor;
pub mod workspace;

pub use config::{PoolConfig, WireProtocol, WorkerCommand, WorkerLifecycle};
pub use dispatcher::{Dispatcher, OutcomeCounts, TaskReport, TaskRunner};
pub use error::PoolError;
pub use supervisor::{PoolStats, Supervisor, WorkerStats};
pub use workspace::{MaterializedTask, TaskPaths, Workspace, ARTIFACT_EXTENSION};
