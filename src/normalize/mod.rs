pub mod parser;

pub use parser::{normalize, parse_location};
