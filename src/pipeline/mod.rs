//! The reconciliation pipeline.
//!
//! One scan cycle flows through:
//! 1. `Processor::scan()` — search and fetch matching mail
//! 2. `extract::report_attachments()` — pull report bytes per message
//! 3. `transform::parse_report()` — rows → reconciliation records
//! 4. `RecordSink::submit()` — one batch per cycle
//! 5. Archive move — only after the batch was accepted

pub mod extract;
pub mod processor;
pub mod transform;
pub mod types;

pub use processor::Processor;
pub use types::{ReconciliationRecord, ReportRow};
