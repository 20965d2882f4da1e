//! Graceful shutdown coordinator
//!
//! One coordinator per process. The command loop, the gateway and the signal
//! handler all hold it; whichever fires first wins and the rest observe it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Why the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `shutdown` control command from a client
    Command,
    /// SIGINT / SIGTERM / Ctrl+C
    Signal,
    /// The embedding code asked for it
    Requested,
}

/// Graceful shutdown coordinator
#[derive(Debug)]
pub struct ShutdownCoordinator {
    shutting_down: AtomicBool,
    shutdown_tx: broadcast::Sender<ShutdownReason>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self { shutting_down: AtomicBool::new(false), shutdown_tx }
    }

    /// Subscribe to shutdown notifications
    ///
    /// A receiver created after the trigger never sees the message; pair it
    /// with [`is_shutting_down`](Self::is_shutting_down) or use
    /// [`wait_for_shutdown`](Self::wait_for_shutdown).
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown. Returns false if it was already triggered.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!(?reason, "Shutdown already in progress");
            return false;
        }
        info!(?reason, "Initiating graceful shutdown");
        // No receivers just means nothing is running yet
        let _ = self.shutdown_tx.send(reason);
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been triggered, even if that happened earlier
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }
}

/// Install signal handlers for graceful shutdown
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.shutdown(ShutdownReason::Signal);
    });
    Ok(())
}

/// Install signal handlers for graceful shutdown (Windows)
#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                coordinator.shutdown(ShutdownReason::Signal);
            }
            Err(e) => tracing::warn!(error = %e, "Ctrl+C handler failed"),
        }
    });
    Ok(())
}
