//! Record transformation: report bytes → reconciliation records.

use crate::error::ReportError;
use crate::pipeline::types::{INCREMENT_PREFIX, ReconciliationRecord, ReportRow, VENDOR_PREFIX};

/// Fixed non-data lines the report generator emits before the table.
const PREAMBLE_LINES: usize = 5;

/// Fixed non-data lines after the table.
const TRAILER_LINES: usize = 1;

/// Parse one report payload into an ordered sequence of records.
///
/// The framing is a property of the upstream report generator, not a
/// general tabular format: exactly [`PREAMBLE_LINES`] lines, then a
/// header-labeled CSV table, then [`TRAILER_LINES`] lines. Both are
/// stripped unconditionally, never auto-detected.
///
/// Any malformed row fails the whole report; the caller leaves the
/// originating message unarchived so it is retried visibly instead of
/// archiving a partially-submitted report.
pub fn parse_report(data: &[u8]) -> Result<Vec<ReconciliationRecord>, ReportError> {
    let text = String::from_utf8(data.to_vec())?;
    let lines: Vec<&str> = text.lines().collect();

    // Header line must survive the framing strip.
    let min_lines = PREAMBLE_LINES + TRAILER_LINES + 1;
    if lines.len() < min_lines {
        return Err(ReportError::TooShort {
            expected: min_lines,
            actual: lines.len(),
        });
    }

    let table = lines[PREAMBLE_LINES..lines.len() - TRAILER_LINES].join("\n");
    let mut reader = csv::Reader::from_reader(table.as_bytes());

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<ReportRow>().enumerate() {
        records.push(transform_row(&row?, idx + 1)?);
    }
    Ok(records)
}

/// Map one report row to a reconciliation record.
///
/// The transaction id is rewritten `KPSORx<digits>` → `OR-<digits>`:
/// ids must start with `KPS` upstream while `-` is not allowed there,
/// so the report carries the vendor spelling of our increment id. An id
/// without the prefix is rejected rather than forwarded misshapen.
pub fn transform_row(row: &ReportRow, row_number: usize) -> Result<ReconciliationRecord, ReportError> {
    let Some(suffix) = row.transaction_id.strip_prefix(VENDOR_PREFIX) else {
        return Err(ReportError::BadTransactionId {
            row: row_number,
            id: row.transaction_id.clone(),
            prefix: VENDOR_PREFIX,
        });
    };

    Ok(ReconciliationRecord {
        increment_id: format!("{INCREMENT_PREFIX}{suffix}"),
        amount: row.paid.clone(),
        comment: format!(
            "KShop: {}, {}, {} ({})",
            row.date_time, row.paid, row.from_account, row.source_of_fund
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Transaction ID,Paid,Date Time,From Account,Source of Fund";

    fn framed(rows: &[&str]) -> Vec<u8> {
        let mut lines = vec![
            "KShop Payment Report",
            "Merchant: Example Store",
            "Period: 2023-01-01 - 2023-01-31",
            "Currency: THB",
            "",
            HEADER,
        ];
        lines.extend_from_slice(rows);
        lines.push("End of report");
        lines.join("\n").into_bytes()
    }

    #[test]
    fn rewrites_vendor_prefix() {
        let data = framed(&["KPSORx20021182,10.00,2023-01-05 11:22,012-3-45678-9,PromptPay"]);
        let records = parse_report(&data).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].increment_id, "OR-20021182");
        assert_eq!(records[0].amount, "10.00");
    }

    #[test]
    fn every_record_starts_with_increment_prefix() {
        let data = framed(&[
            "KPSORx20021205,10.00,2023-01-05 11:22,012-3-45678-9,PromptPay",
            "KPSORx20021206,25.50,2023-01-05 12:00,012-3-45678-9,QR",
            "KPSORx20021207,7.25,2023-01-05 12:30,098-7-65432-1,PromptPay",
        ]);
        let records = parse_report(&data).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.increment_id.starts_with("OR-")));
    }

    #[test]
    fn record_count_equals_data_rows_in_order() {
        let data = framed(&[
            "KPSORx1,1.00,t1,a1,s1",
            "KPSORx2,2.00,t2,a2,s2",
            "KPSORx3,3.00,t3,a3,s3",
        ]);
        let records = parse_report(&data).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.increment_id.as_str()).collect();
        assert_eq!(ids, ["OR-1", "OR-2", "OR-3"]);
    }

    #[test]
    fn comment_uses_audit_template() {
        let data = framed(&["KPSORx9,99.00,2023-02-01 09:00,111-2-33333-4,TrueMoney"]);
        let records = parse_report(&data).unwrap();
        assert_eq!(
            records[0].comment,
            "KShop: 2023-02-01 09:00, 99.00, 111-2-33333-4 (TrueMoney)"
        );
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let data = framed(&["ORD20021182,10.00,t,a,s"]);
        let err = parse_report(&data).unwrap_err();
        assert!(matches!(
            err,
            ReportError::BadTransactionId { row: 1, .. }
        ));
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = parse_report(b"too\nshort").unwrap_err();
        assert!(matches!(err, ReportError::TooShort { .. }));
    }

    #[test]
    fn table_with_no_data_rows_yields_no_records() {
        let data = framed(&[]);
        assert!(parse_report(&data).unwrap().is_empty());
    }

    #[test]
    fn missing_column_is_a_csv_error() {
        let mut lines = vec!["p1", "p2", "p3", "p4", "p5", "Transaction ID,Paid"];
        lines.push("KPSORx1,10.00");
        lines.push("trailer");
        let data = lines.join("\n").into_bytes();
        assert!(matches!(
            parse_report(&data).unwrap_err(),
            ReportError::Csv(_)
        ));
    }
}
