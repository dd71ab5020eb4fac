pub mod app;
pub mod commands;
pub mod runtime;

pub use app::{Cli, Commands};
