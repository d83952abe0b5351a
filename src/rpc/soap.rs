//! Minimal Magento v1 SOAP transport.
//!
//! Two calls are needed: `login` (session token) and
//! `kbankqrInvoiceMany` (batch invoice). Envelopes are built and parsed
//! as strings; the handful of scalar fields involved does not warrant a
//! full XML stack. The WSDL is fetched once and cached on disk at a
//! fixed path so restarts skip the expensive warm-up.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::RpcError;
use crate::pipeline::types::ReconciliationRecord;

/// A resolved SOAP service endpoint plus the HTTP client for it.
pub struct SoapClient {
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl SoapClient {
    /// Fetch (or load from cache) the WSDL and resolve the service
    /// endpoint. This is the expensive part of client construction.
    pub fn new(wsdl_url: &str, cache_dir: &Path) -> Result<Self, RpcError> {
        let http = reqwest::blocking::Client::new();
        let wsdl = load_wsdl(&http, wsdl_url, cache_dir)?;
        let endpoint = endpoint_from_wsdl(&wsdl).ok_or(RpcError::NoEndpoint)?;
        debug!(endpoint = %endpoint, "SOAP endpoint resolved");
        Ok(Self { endpoint, http })
    }

    /// Authenticate; returns the session token.
    pub fn login(&self, username: &str, api_key: &str) -> Result<String, RpcError> {
        let body = self.call("login", &login_envelope(username, api_key))?;
        extract_tag_text(&body, "loginReturn").ok_or(RpcError::MalformedResponse {
            element: "loginReturn",
        })
    }

    /// Submit one batch of records via `kbankqrInvoiceMany`. Returns the
    /// raw result payload for logging.
    pub fn submit_invoices(
        &self,
        session_token: &str,
        records: &[ReconciliationRecord],
    ) -> Result<String, RpcError> {
        let body = self.call(
            "kbankqrInvoiceMany",
            &invoice_envelope(session_token, records),
        )?;
        extract_tag_text(&body, "kbankqrInvoiceManyReturn").ok_or(RpcError::MalformedResponse {
            element: "kbankqrInvoiceManyReturn",
        })
    }

    fn call(&self, action: &str, envelope: &str) -> Result<String, RpcError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("urn:Magento#{action}"))
            .body(envelope.to_string())
            .send()?;
        let body = response.text()?;

        if let Some(fault) = extract_tag_text(&body, "faultstring") {
            return Err(RpcError::Fault(fault));
        }
        Ok(body)
    }
}

/// Load the WSDL through the on-disk cache. The cache file name is a
/// digest of the URL, so a changed endpoint never reuses a stale copy.
fn load_wsdl(
    http: &reqwest::blocking::Client,
    wsdl_url: &str,
    cache_dir: &Path,
) -> Result<String, RpcError> {
    std::fs::create_dir_all(cache_dir)?;
    let digest = Sha256::digest(wsdl_url.as_bytes());
    let path = cache_dir.join(format!("{digest:x}.wsdl"));

    if path.exists() {
        debug!(path = %path.display(), "Using cached WSDL");
        return Ok(std::fs::read_to_string(&path)?);
    }

    info!(url = %wsdl_url, "Fetching WSDL (first use)");
    let wsdl = http
        .get(wsdl_url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| RpcError::WsdlFetch(e.to_string()))?
        .text()?;
    std::fs::write(&path, &wsdl)?;
    Ok(wsdl)
}

/// Pull the `location` attribute of the `soap:address` binding element.
fn endpoint_from_wsdl(wsdl: &str) -> Option<String> {
    let addr = wsdl.find(":address")?;
    let rest = &wsdl[addr..];
    let loc = rest.find("location=\"")? + "location=\"".len();
    let end = rest[loc..].find('"')? + loc;
    Some(rest[loc..end].to_string())
}

fn login_envelope(username: &str, api_key: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:urn="urn:Magento">
  <SOAP-ENV:Body>
    <urn:login>
      <username>{}</username>
      <apiKey>{}</apiKey>
    </urn:login>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        xml_escape(username),
        xml_escape(api_key)
    )
}

fn invoice_envelope(session_token: &str, records: &[ReconciliationRecord]) -> String {
    let mut items = String::new();
    for record in records {
        items.push_str(&format!(
            "      <item>\n        <increment_id>{}</increment_id>\n        <amount>{}</amount>\n        <comment>{}</comment>\n      </item>\n",
            xml_escape(&record.increment_id),
            xml_escape(&record.amount),
            xml_escape(&record.comment)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:urn="urn:Magento">
  <SOAP-ENV:Body>
    <urn:kbankqrInvoiceMany>
      <sessionId>{}</sessionId>
      <orderInfoList>
{}      </orderInfoList>
    </urn:kbankqrInvoiceMany>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        xml_escape(session_token),
        items
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Extract the text content of the first element named `tag`, ignoring
/// any namespace prefix and attributes. Good enough for the scalar
/// return values this client reads; not a general XML parser.
fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = xml[search..].find(tag) {
        let start = search + rel;
        // Must be the start of an element name.
        let preceded = xml[..start].chars().last();
        if !matches!(preceded, Some('<') | Some(':')) {
            search = start + tag.len();
            continue;
        }
        let open_end = xml[start..].find('>')? + start;
        if xml[..open_end].ends_with('/') {
            // Self-closing, no content.
            return Some(String::new());
        }
        let close_rel = xml[open_end + 1..].find(&format!("{tag}>"))?;
        let close_name = open_end + 1 + close_rel;
        let close_start = xml[..close_name].rfind("</")?;
        return Some(xml_unescape(xml[open_end + 1..close_start].trim()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_resolved_from_wsdl() {
        let wsdl = r#"<definitions><service><port>
            <soap:address location="https://store.example/api/v1_soap/index/"/>
        </port></service></definitions>"#;
        assert_eq!(
            endpoint_from_wsdl(wsdl).as_deref(),
            Some("https://store.example/api/v1_soap/index/")
        );
    }

    #[test]
    fn endpoint_missing_is_none() {
        assert_eq!(endpoint_from_wsdl("<definitions/>"), None);
    }

    #[test]
    fn login_token_extracted() {
        let body = r#"<SOAP-ENV:Envelope><SOAP-ENV:Body><ns1:loginResponse>
            <loginReturn xsi:type="xsd:string">abc123token</loginReturn>
        </ns1:loginResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;
        assert_eq!(
            extract_tag_text(body, "loginReturn").as_deref(),
            Some("abc123token")
        );
    }

    #[test]
    fn prefixed_close_tag_extracted() {
        let body = "<ns1:loginReturn>tok</ns1:loginReturn>";
        assert_eq!(extract_tag_text(body, "loginReturn").as_deref(), Some("tok"));
    }

    #[test]
    fn fault_string_detected() {
        let body = r#"<Envelope><Body><Fault>
            <faultcode>2</faultcode>
            <faultstring>Access denied.</faultstring>
        </Fault></Body></Envelope>"#;
        assert_eq!(
            extract_tag_text(body, "faultstring").as_deref(),
            Some("Access denied.")
        );
    }

    #[test]
    fn missing_tag_is_none() {
        assert_eq!(extract_tag_text("<a>b</a>", "loginReturn"), None);
    }

    #[test]
    fn envelope_escapes_record_fields() {
        let records = vec![ReconciliationRecord {
            increment_id: "OR-1".into(),
            amount: "10.00".into(),
            comment: "a < b & \"c\"".into(),
        }];
        let envelope = invoice_envelope("tok", &records);
        assert!(envelope.contains("a &lt; b &amp; &quot;c&quot;"));
        assert!(envelope.contains("<sessionId>tok</sessionId>"));
        assert!(envelope.contains("<increment_id>OR-1</increment_id>"));
    }

    #[test]
    fn envelope_has_one_item_per_record() {
        let records: Vec<ReconciliationRecord> = (0..3)
            .map(|i| ReconciliationRecord {
                increment_id: format!("OR-{i}"),
                amount: "1.00".into(),
                comment: "c".into(),
            })
            .collect();
        let envelope = invoice_envelope("tok", &records);
        assert_eq!(envelope.matches("<item>").count(), 3);
    }

    #[test]
    fn wsdl_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://store.example/api?wsdl";
        let digest = Sha256::digest(url.as_bytes());
        let path = dir.path().join(format!("{digest:x}.wsdl"));
        std::fs::write(&path, "<definitions/>").unwrap();

        // Cached copy is served without touching the network.
        let http = reqwest::blocking::Client::new();
        let wsdl = load_wsdl(&http, url, dir.path()).unwrap();
        assert_eq!(wsdl, "<definitions/>");
    }
}
