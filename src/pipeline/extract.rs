//! Attachment extraction: find the payment report inside a raw message.

use mail_parser::{MessageParser, MimeHeaders};

use crate::error::ReportError;

/// File extension of the vendor report. The suffix match is
/// case-sensitive; the report generator emits lowercase names.
pub const REPORT_EXTENSION: &str = ".csv";

/// Return the decoded payload bytes of every report attachment, in
/// message-part order. Zero matches is valid: the message is simply not
/// a report mail.
///
/// Pure function of the raw bytes. Leaf parts only, parts without a
/// disposition marking are inline body text and skipped; filenames are
/// decoded per their declared encoding by the parser.
pub fn report_attachments(raw: &[u8]) -> Result<Vec<Vec<u8>>, ReportError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or(ReportError::UnparseableMessage)?;

    let mut payloads = Vec::new();
    for part in parsed.attachments() {
        if part.content_disposition().is_none() {
            continue;
        }
        let Some(name) = part.attachment_name() else {
            continue;
        };
        if name.ends_with(REPORT_EXTENSION) {
            payloads.push(part.contents().to_vec());
        }
    }
    Ok(payloads)
}
