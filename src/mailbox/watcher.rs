//! The mailbox event loop: wait for server-pushed change notifications
//! and drive scan-and-process passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::MailboxConfig;
use crate::error::Result;
use crate::mailbox::MailboxSession;
use crate::pipeline::Processor;

/// Per-attempt push-wait timeout.
pub const IDLE_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll attempts per wait cycle. The cycle is re-entered fresh after
/// this many empty polls so the server never sees one IDLE held open
/// long enough to terminate it unilaterally.
pub const IDLE_POLL_ATTEMPTS: usize = 10;

/// Cooperative shutdown flag, set by the interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Owns one run of the event loop over a live mailbox session.
pub struct Watcher {
    config: MailboxConfig,
    shutdown: ShutdownFlag,
}

impl Watcher {
    pub fn new(config: MailboxConfig, shutdown: ShutdownFlag) -> Self {
        Self { config, shutdown }
    }

    /// Run until interrupted. Startup: login, select INBOX, ensure the
    /// archive folder exists, then one eager scan for mail that arrived
    /// while we were down. After that, alternate between bounded IDLE
    /// wait cycles and notification-triggered scans.
    ///
    /// Errors are not contained here (except batch submission, which the
    /// processor contains): an escaped error ends the run and the
    /// supervisor restarts it with fresh state.
    pub fn run(
        &self,
        session: &mut dyn MailboxSession,
        processor: &mut Processor,
    ) -> Result<()> {
        let cfg = &self.config;
        session.login(&cfg.username, cfg.password.expose_secret())?;
        session.select_folder("INBOX")?;

        if !session.folder_exists(&cfg.archive_folder)? {
            info!(folder = %cfg.archive_folder, "Creating archive folder");
            session.create_folder(&cfg.archive_folder)?;
        }

        // Mail that arrived before we started waiting.
        processor.scan(session)?;

        info!("Entering IDLE wait, interrupt to exit");
        while !self.shutdown.is_set() {
            session.idle_start()?;

            let mut event = None;
            for _ in 0..IDLE_POLL_ATTEMPTS {
                if self.shutdown.is_set() {
                    break;
                }
                if let Some(ev) = session.idle_poll(IDLE_POLL_TIMEOUT)? {
                    event = Some(ev);
                    break;
                }
            }

            // Push mode and normal commands are mutually exclusive;
            // always leave IDLE before doing anything else.
            session.idle_done()?;

            if self.shutdown.is_set() {
                break;
            }

            match event {
                Some(ev) => {
                    debug!(event = %ev.raw, "Server push notification");
                    processor.scan(session)?;
                }
                None => {
                    // All attempts passed with nothing pushed;
                    // re-enter the wait cycle fresh.
                    debug!("No notification this cycle");
                }
            }
        }

        info!("Shutdown requested, logging out");
        session.logout()?;
        Ok(())
    }
}
