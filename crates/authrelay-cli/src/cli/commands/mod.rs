//! CLI command handlers, one per file.

mod burst;
mod completions;
mod config;
mod get;
mod sign_out;

pub use burst::run_burst;
pub use completions::run_completions;
pub use config::run_config;
pub use get::run_get;
pub use sign_out::run_sign_out;
