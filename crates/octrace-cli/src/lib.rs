mod args;
mod commands;
mod context;
mod handlers;
pub mod logging;

pub use args::{Cli, Commands, OutputFormat};
pub use commands::run;
pub use context::ExecutionContext;
