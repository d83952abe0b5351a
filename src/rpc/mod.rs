//! Outbound RPC to the remote accounting service.

pub mod soap;
pub mod submitter;

pub use soap::SoapClient;
pub use submitter::SoapSubmitter;

use crate::error::RpcError;
use crate::pipeline::types::ReconciliationRecord;

/// Destination for one batch of reconciliation records.
///
/// The batch either succeeds atomically (returning an opaque result
/// string that is logged, not interpreted) or fails as a whole.
pub trait RecordSink {
    fn submit(&mut self, batch: &[ReconciliationRecord]) -> Result<String, RpcError>;
}
