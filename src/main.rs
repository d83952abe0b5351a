use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use kshop_reconciler::config::Config;
use kshop_reconciler::mailbox::{ImapSession, ShutdownFlag, Watcher};
use kshop_reconciler::pipeline::Processor;
use kshop_reconciler::rpc::SoapSubmitter;

/// Delay before restarting the event loop after an escaped error.
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// A second interrupt within this window forces immediate exit.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("invalid environment configuration")?;

    info!(
        host = %config.mailbox.host,
        filter = %config.mailbox.search_filter(),
        archive = %config.mailbox.archive_folder,
        "kshop-reconciler v{}",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown = ShutdownFlag::new();
    spawn_interrupt_handler(shutdown.clone());

    // Supervisor: restart the event loop on failure, stop on clean
    // shutdown. Each run rebuilds all state from scratch; the mailbox
    // is the durable source of truth for what still needs processing.
    loop {
        let cfg = config.clone();
        let flag = shutdown.clone();
        let outcome = tokio::task::spawn_blocking(move || run_event_loop(&cfg, flag)).await;

        match outcome {
            Ok(Ok(())) => {
                info!("Shut down cleanly");
                break;
            }
            Ok(Err(e)) => error!(error = %e, "Event loop died"),
            Err(e) => error!(error = %e, "Event loop panicked"),
        }

        if shutdown.is_set() {
            break;
        }
        info!("Restarting in {}s", RESTART_DELAY.as_secs());
        tokio::time::sleep(RESTART_DELAY).await;
    }

    Ok(())
}

/// One full run: connect, then hand control to the watcher until it
/// errors out or shutdown is requested.
fn run_event_loop(config: &Config, shutdown: ShutdownFlag) -> kshop_reconciler::error::Result<()> {
    let mut session = ImapSession::connect(&config.mailbox.host, config.mailbox.port)?;
    let mut processor = Processor::new(
        config.mailbox.search_filter(),
        config.mailbox.archive_folder.clone(),
        Box::new(SoapSubmitter::new(config.rpc.clone())),
    );
    Watcher::new(config.mailbox.clone(), shutdown).run(&mut session, &mut processor)
}

/// First interrupt requests an orderly shutdown (the watcher finishes
/// its wait cycle and logs out). A second interrupt within the grace
/// window skips the orderly path and exits immediately; one stray ^C
/// must not kill an unattended process without confirmation.
fn spawn_interrupt_handler(shutdown: ShutdownFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        shutdown.request();
        warn!(
            "Interrupt received, shutting down; interrupt again within {}s to force exit",
            DOUBLE_INTERRUPT_WINDOW.as_secs()
        );

        if tokio::time::timeout(DOUBLE_INTERRUPT_WINDOW, tokio::signal::ctrl_c())
            .await
            .is_ok()
        {
            warn!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }

        // Orderly shutdown is underway; any further interrupt still
        // forces exit rather than being ignored.
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupt during shutdown, exiting immediately");
            std::process::exit(130);
        }
    });
}
