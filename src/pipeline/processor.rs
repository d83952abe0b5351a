//! One scan-and-process pass over the mailbox.

use tracing::{debug, error, info, warn};

use crate::error::{ReportError, Result};
use crate::mailbox::{FetchedMessage, MailboxSession};
use crate::pipeline::types::ReconciliationRecord;
use crate::pipeline::{extract, transform};
use crate::rpc::RecordSink;

/// Composes extraction, transformation and submission for one scan
/// cycle, and archives messages whose records were accepted.
pub struct Processor {
    filter: String,
    archive_folder: String,
    sink: Box<dyn RecordSink>,
}

impl Processor {
    pub fn new(filter: String, archive_folder: String, sink: Box<dyn RecordSink>) -> Self {
        Self {
            filter,
            archive_folder,
            sink,
        }
    }

    /// Run one scan cycle: search, fetch, extract, transform, submit the
    /// cycle's records as one batch, archive contributing messages.
    ///
    /// Containment rules:
    /// - a message that fails extraction or parsing is logged, skipped
    ///   and left unarchived; it does not abort the cycle;
    /// - a failed batch submission leaves every contributing message
    ///   unarchived, so the next scan naturally retries them
    ///   (at-least-once, duplicates accepted);
    /// - mailbox errors propagate and end the run.
    pub fn scan(&mut self, session: &mut dyn MailboxSession) -> Result<()> {
        let uids = session.search(&self.filter)?;
        if uids.is_empty() {
            debug!("No new transactional mail");
            return Ok(());
        }

        info!(count = uids.len(), "Processing mail");
        let messages = session.fetch(&uids)?;

        let mut batch: Vec<ReconciliationRecord> = Vec::new();
        let mut contributors: Vec<u32> = Vec::new();
        for message in &messages {
            match collect_records(message) {
                Ok(records) if records.is_empty() => {
                    debug!(uid = message.uid, "No report attachment, leaving in place");
                }
                Ok(records) => {
                    debug!(uid = message.uid, records = records.len(), "Extracted records");
                    batch.extend(records);
                    contributors.push(message.uid);
                }
                Err(e) => {
                    warn!(uid = message.uid, error = %e, "Malformed message, leaving unarchived");
                }
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        info!(
            records = batch.len(),
            messages = contributors.len(),
            "Submitting batch"
        );
        match self.sink.submit(&batch) {
            Ok(outcome) => {
                info!(result = %outcome, "Batch accepted");
                // Archive strictly after submission succeeded: never
                // acknowledge mail whose records did not reach the
                // remote service.
                session.move_messages(&contributors, &self.archive_folder)?;
                info!(folder = %self.archive_folder, messages = contributors.len(), "Archived");
            }
            Err(e) => {
                error!(error = %e, "Batch submission failed, messages left for retry");
            }
        }
        Ok(())
    }
}

/// All records from one message's report attachments.
fn collect_records(message: &FetchedMessage) -> Result<Vec<ReconciliationRecord>, ReportError> {
    let mut records = Vec::new();
    for payload in extract::report_attachments(&message.raw)? {
        records.extend(transform::parse_report(&payload)?);
    }
    Ok(records)
}
