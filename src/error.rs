//! Error types for the reconciler.

/// Top-level error type.
///
/// Only [`RpcError`] is contained by its caller (batch-level, with
/// natural retry via non-archival). Everything else propagates out of
/// the event loop and ends the run; the supervisor in `main` restarts
/// it after a short delay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// IMAP transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Login failed for {user}")]
    LoginFailed { user: String },

    #[error("Command {command} failed: {response}")]
    CommandFailed { command: String, response: String },

    #[error("Unexpected server response: {0}")]
    UnexpectedResponse(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Report extraction/parsing errors. Contained per message: the
/// offending message is skipped and left unarchived.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Report too short: expected at least {expected} framing lines, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: transaction id {id:?} does not start with {prefix:?}")]
    BadTransactionId {
        row: usize,
        id: String,
        prefix: &'static str,
    },

    #[error("Message could not be parsed as an email")]
    UnparseableMessage,
}

/// Remote submission errors. Contained per batch: the originating
/// messages are left unarchived and retried on the next scan.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("WSDL fetch failed: {0}")]
    WsdlFetch(String),

    #[error("WSDL has no soap:address endpoint")]
    NoEndpoint,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cache IO error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Remote fault: {0}")]
    Fault(String),

    #[error("Malformed response: missing {element} element")]
    MalformedResponse { element: &'static str },
}

/// Result type alias for the reconciler.
pub type Result<T, E = Error> = std::result::Result<T, E>;
