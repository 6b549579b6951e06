pub mod commands;
pub mod compare;
pub mod progress;
pub mod run;
pub mod validate;

pub use commands::{Cli, Commands};
