//! Batch submission with a lazily built, cached SOAP client.

use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::pipeline::types::ReconciliationRecord;
use crate::rpc::{RecordSink, SoapClient};

/// Owns the RPC session for the life of one event-loop run.
///
/// The client is built on the first batch (WSDL fetch and cache
/// warm-up) and reused for every batch after that. The session token is
/// not reused: a fresh `login` precedes every batch, so an expired
/// token can never fail a submission mid-run.
pub struct SoapSubmitter {
    config: RpcConfig,
    client: Option<SoapClient>,
}

impl SoapSubmitter {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }
}

impl RecordSink for SoapSubmitter {
    fn submit(&mut self, batch: &[ReconciliationRecord]) -> Result<String, RpcError> {
        let client = match &mut self.client {
            Some(client) => client,
            slot @ None => {
                info!("Initializing SOAP client, this can take a while");
                slot.insert(SoapClient::new(&self.config.wsdl_url, &self.config.cache_dir)?)
            }
        };

        let token = client.login(&self.config.username, self.config.api_key.expose_secret())?;
        debug!(records = batch.len(), "Calling kbankqrInvoiceMany");
        client.submit_invoices(&token, batch)
    }
}
