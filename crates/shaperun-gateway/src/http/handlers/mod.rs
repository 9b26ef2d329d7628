//! HTTP request handlers.

mod health;
mod model;
mod workers;

pub use health::{health_check, metrics_handler};
pub use model::{download_model, generate_model};
pub use workers::list_workers;

