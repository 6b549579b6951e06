pub mod registry;
pub mod runner;

pub use registry::{Dimension, DimensionName, DIMENSIONS};
pub use runner::{DimensionOutcome, DimensionRunner};
