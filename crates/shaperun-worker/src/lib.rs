//! shaperun worker process.
//!
//! A worker owns one [`ShapeEngine`](shaperun_engine::ShapeEngine) and runs
//! tasks through it one at a time. Three lifecycles share the same
//! [`Executor`]:
//!
//! - [`run_cold`]: one task from the command line, outcome in the exit code
//! - [`serve_structured`]: persistent loop over JSON task lines (`OK`/`ERR`)
//! - [`serve_path_pairs`]: persistent loop over `script|output` lines
//!
//! Stdout is the control channel in the persistent modes, so all logging
//! goes to stderr.

pub mod cold;
pub mod env;
pub mod error;
pub mod executor;
pub mod paths;
pub mod serve;

pub use cold::run_cold;
pub use env::setup_environment;
pub use error::WorkerError;
pub use executor::Executor;
pub use paths::serve_path_pairs;
pub use serve::serve_structured;
