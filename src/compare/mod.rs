pub mod arbitration;
pub mod comparator;

pub use arbitration::{Arbitrator, EngineArbitrator};
pub use comparator::Comparator;
