//! Shared types for the reconciliation pipeline.

use serde::{Deserialize, Serialize};

/// Vendor prefix every KShop transaction id must carry.
pub const VENDOR_PREFIX: &str = "KPSORx";

/// Prefix of order increment ids on the accounting side.
pub const INCREMENT_PREFIX: &str = "OR-";

/// One data row of the KShop payment report, as labeled in the CSV header.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Transaction ID")]
    pub transaction_id: String,
    /// Paid amount, a decimal string. Forwarded verbatim; the remote
    /// service interprets it.
    #[serde(rename = "Paid")]
    pub paid: String,
    #[serde(rename = "Date Time")]
    pub date_time: String,
    #[serde(rename = "From Account")]
    pub from_account: String,
    #[serde(rename = "Source of Fund")]
    pub source_of_fund: String,
}

/// The unit submitted to the remote accounting service.
///
/// Lives only inside the batch being submitted; never retried
/// individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationRecord {
    /// Order increment id, always `OR-`-prefixed.
    pub increment_id: String,
    /// Paid amount, copied verbatim from the report row.
    pub amount: String,
    /// Human-readable audit string; informational only, never parsed back.
    pub comment: String,
}
