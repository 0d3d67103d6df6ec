//! Cooperative shutdown.
//!
//! One [`ShutdownCoordinator`] per daemon. Signals, a failed acceptor or a
//! caller initiate shutdown once; every [`ShutdownListener`] resolves,
//! including listeners created after the fact.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Why the daemon is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Sigterm,
    Sigint,
    /// The listener failed and the daemon can no longer accept clients.
    AcceptorFailed,
    Programmatic,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
            Self::AcceptorFailed => write!(f, "ACCEPTOR_FAILED"),
            Self::Programmatic => write!(f, "PROGRAMMATIC"),
        }
    }
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    initiated: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<ShutdownReason>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            initiated: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    #[must_use]
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            initiated: Arc::clone(&self.initiated),
            shutdown_rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Broadcast shutdown. Returns `false` if it was already initiated.
    pub fn initiate(&self, reason: ShutdownReason) -> bool {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(reason = %reason, "Shutdown already in progress, ignoring");
            return false;
        }

        info!(
            reason = %reason,
            subscribers = self.shutdown_tx.receiver_count(),
            "Initiating shutdown"
        );
        if let Err(e) = self.shutdown_tx.send(reason) {
            debug!("No active subscribers for shutdown signal: {}", e);
        }
        true
    }

    /// Translate SIGINT/SIGTERM into shutdown. Returns once shutdown has
    /// been initiated by anyone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signal`] when a handler cannot be installed.
    pub async fn watch_signals(&self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate()).map_err(|source| Error::Signal {
            signal: "SIGTERM",
            source,
        })?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(|source| Error::Signal {
            signal: "SIGINT",
            source,
        })?;

        tokio::select! {
            _ = sigterm.recv() => { self.initiate(ShutdownReason::Sigterm); }
            _ = sigint.recv() => { self.initiate(ShutdownReason::Sigint); }
            () = self.subscribe().wait() => {}
        }
        Ok(())
    }
}

/// Resolves once shutdown is initiated.
#[derive(Debug)]
pub struct ShutdownListener {
    initiated: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<ShutdownReason>,
}

impl ShutdownListener {
    pub async fn wait(mut self) {
        if self.initiated.load(Ordering::Acquire) {
            return;
        }
        // Any outcome, including a closed or lagged channel, means stop.
        let _ = self.shutdown_rx.recv().await;
    }
}
