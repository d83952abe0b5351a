//! Configuration, built from environment variables at startup.

use secrecy::SecretString;

use crate::error::ConfigError;

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// IMAP account settings plus the search filter for report mail.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Sender address the report mail must come from.
    pub mail_from: String,
    /// Delivered-to address the report mail must match.
    pub mail_to: String,
    /// Folder processed messages are moved into.
    pub archive_folder: String,
}

impl MailboxConfig {
    /// Gmail `X-GM-RAW` filter selecting unprocessed report mail.
    pub fn search_filter(&self) -> String {
        format!(
            "in:inbox from:{} deliveredto:{} has:attachment filename:csv",
            self.mail_from, self.mail_to
        )
    }
}

/// Remote accounting service (Magento SOAP v1) settings.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub wsdl_url: String,
    pub username: String,
    pub api_key: SecretString,
    /// Directory the fetched WSDL is cached in across restarts.
    pub cache_dir: std::path::PathBuf,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mailbox: MailboxConfig,
    pub rpc: RpcConfig,
}

impl Config {
    /// Build config from environment variables. Missing required
    /// variables are a hard error; the process should not start half
    /// configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = match std::env::var("IMAP_PORT") {
            Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
                key: "IMAP_PORT".into(),
                message: format!("not a port number: {s}"),
            })?,
            Err(_) => 993,
        };

        let mailbox = MailboxConfig {
            host: required("IMAP_HOST")?,
            port,
            username: required("IMAP_USERNAME")?,
            password: SecretString::from(required("IMAP_PASSWORD")?),
            mail_from: required("MAIL_FROM")?,
            mail_to: required("MAIL_TO")?,
            archive_folder: std::env::var("ARCHIVE_FOLDER")
                .unwrap_or_else(|_| "Processed".to_string()),
        };

        let rpc = RpcConfig {
            wsdl_url: required("SOAP_WSDL")?,
            username: required("SOAP_USER")?,
            api_key: SecretString::from(required("SOAP_API_KEY")?),
            cache_dir: std::env::var("SOAP_CACHE_DIR")
                .unwrap_or_else(|_| "./soap-cache".to_string())
                .into(),
        };

        Ok(Self { mailbox, rpc })
    }
}
