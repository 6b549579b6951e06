pub mod finding;
pub mod report;
pub mod comparison;

pub use finding::*;
pub use report::*;
pub use comparison::*;
