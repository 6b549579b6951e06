pub mod audit;
pub mod cli;
pub mod compare;
pub mod config;
pub mod dimensions;
pub mod engine;
pub mod errors;
pub mod isolation;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reporting;
pub mod utils;

/// Package version plus the commit it was built from.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");
