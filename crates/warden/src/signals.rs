//! Signal handling for graceful shutdown.
//!
//! The first SIGINT/SIGTERM (Ctrl+C on Windows) initiates a graceful shutdown
//! through the shared [`ShutdownState`]; a second one before the shutdown
//! completes exits immediately.

use std::future::Future;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_event_system::ShutdownState;

/// Resolves on the next termination signal.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Drives `shutdown` from process signals until the shutdown completes.
pub fn watch_signals(shutdown: ShutdownState) -> JoinHandle<()> {
    tokio::spawn(watch(shutdown, wait_for_signal))
}

async fn watch<F, Fut>(shutdown: ShutdownState, mut next_signal: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    loop {
        if let Err(e) = next_signal().await {
            // Without handlers the process could not be stopped cleanly.
            error!("❌ Failed to set up signal handlers: {e}");
            shutdown.initiate_shutdown();
            return;
        }
        if !shutdown.is_shutdown_initiated() {
            info!("📡 Received shutdown signal - initiating graceful shutdown");
            shutdown.initiate_shutdown();
        } else if !shutdown.is_shutdown_complete() {
            warn!("Shutdown signal received again, exiting immediately");
            std::process::exit(1);
        } else {
            return;
        }
    }
}
