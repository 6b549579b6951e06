pub mod log;
pub mod utils;

pub use log::{AuditEvent, AuditLog};
