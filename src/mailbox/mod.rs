//! Mailbox transport abstraction and the event loop built on it.

pub mod imap;
pub mod watcher;

pub use imap::ImapSession;
pub use watcher::{ShutdownFlag, Watcher};

use std::time::Duration;

use crate::error::MailboxError;

/// An opaque server-pushed notification that the mailbox changed.
///
/// Carries no structured payload; it only means "re-scan now". The raw
/// response line is kept for logging.
#[derive(Debug, Clone)]
pub struct MailEvent {
    pub raw: String,
}

/// One fetched mailbox message: server-assigned UID plus raw RFC 822 bytes.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
}

/// Blocking mailbox session.
///
/// Push-wait mode and normal commands are mutually exclusive on the same
/// connection: after [`idle_start`](Self::idle_start), only
/// [`idle_poll`](Self::idle_poll) may be called until
/// [`idle_done`](Self::idle_done) returns.
pub trait MailboxSession {
    fn login(&mut self, user: &str, secret: &str) -> Result<(), MailboxError>;
    fn select_folder(&mut self, name: &str) -> Result<(), MailboxError>;
    fn folder_exists(&mut self, name: &str) -> Result<bool, MailboxError>;
    fn create_folder(&mut self, name: &str) -> Result<(), MailboxError>;

    /// Search the selected folder; returns matching UIDs.
    fn search(&mut self, query: &str) -> Result<Vec<u32>, MailboxError>;

    /// Fetch full messages for the given UIDs.
    fn fetch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, MailboxError>;

    /// Move messages to another folder (the durable "already handled" marker).
    fn move_messages(&mut self, uids: &[u32], dest: &str) -> Result<(), MailboxError>;

    /// Enter server-push wait mode.
    fn idle_start(&mut self) -> Result<(), MailboxError>;

    /// Wait up to `timeout` for one pushed notification.
    fn idle_poll(&mut self, timeout: Duration) -> Result<Option<MailEvent>, MailboxError>;

    /// Leave push mode. Must be called before any other command.
    fn idle_done(&mut self) -> Result<(), MailboxError>;

    fn logout(&mut self) -> Result<(), MailboxError>;
}
