pub mod formatter;
pub mod writer;

pub use writer::{read_run_report, report_stems, write_comparison, write_run_report, ReportWriter};
