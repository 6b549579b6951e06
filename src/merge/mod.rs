pub mod dedup;
pub mod key;

pub use dedup::{canonical_key, deduplicate, merge_group, sort_canonical};
pub use key::{cluster, match_across, DEFAULT_POSITION_TOLERANCE};
