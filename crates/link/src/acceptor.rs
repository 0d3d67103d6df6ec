//! Socket acceptor
//!
//! Binds the local endpoint, meters concurrent connections and hands each
//! admitted socket to a [`ConnectionHandler`] on its own task.
//!
//! Startup checks the socket path first: a live listener is never clobbered,
//! a leftover socket file from a crashed daemon is removed, and anything that
//! is not a socket is refused.

use std::future::Future;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{LinkError, LinkResult};
use crate::socket::{LocalListener, LocalStream, SocketFlavor};
use crate::transport::{Transport, TransportOptions};

/// Default endpoint path.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/splitd.sock";

/// Receives every admitted connection.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, conn_id: u64, transport: Transport<LocalStream>);
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptorConfig {
    pub path: PathBuf,
    pub flavor: SocketFlavor,
    pub max_connections: usize,
    /// How long an accepted socket may wait for a free connection slot.
    pub accept_timeout: Duration,
    /// How long shutdown waits for connection tasks before aborting them.
    pub shutdown_grace: Duration,
    pub transport: TransportOptions,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SOCKET_PATH),
            flavor: SocketFlavor::default(),
            max_connections: 1024,
            accept_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
            transport: TransportOptions::default(),
        }
    }
}

impl AcceptorConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, flavor: SocketFlavor) -> Self {
        Self {
            path: path.into(),
            flavor,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub const fn with_accept_timeout(mut self, accept_timeout: Duration) -> Self {
        self.accept_timeout = accept_timeout;
        self
    }

    #[must_use]
    pub const fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }
}

/// Connection counters, shared with whoever wants to report them.
#[derive(Debug, Default)]
pub struct AcceptorStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    active: AtomicU64,
}

impl AcceptorStats {
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Sockets closed because no slot freed up within the accept timeout.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Connection tasks currently holding a slot.
    #[must_use]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Bound listener plus everything needed to serve it.
pub struct Acceptor<H> {
    config: AcceptorConfig,
    listener: LocalListener,
    handler: Arc<H>,
    slots: Arc<Semaphore>,
    stats: Arc<AcceptorStats>,
    next_conn_id: AtomicU64,
}

impl<H: ConnectionHandler> Acceptor<H> {
    /// Check the path and bind.
    ///
    /// # Errors
    ///
    /// - [`LinkError::AddressInUse`] when a live listener answers on the path
    /// - [`LinkError::NotASocket`] when the path is some other kind of file
    /// - [`LinkError::Io`] when the stale file cannot be removed or bind fails
    pub async fn bind(config: AcceptorConfig, handler: Arc<H>) -> LinkResult<Self> {
        prepare_socket_path(&config.path, config.flavor).await?;

        let listener = LocalListener::bind(config.flavor, &config.path).map_err(|e| {
            LinkError::io(format!("failed to bind {}", config.path.display()), e)
        })?;

        info!(
            path = %config.path.display(),
            flavor = %config.flavor,
            max_connections = config.max_connections,
            "Listening for local clients"
        );

        Ok(Self {
            slots: Arc::new(Semaphore::new(config.max_connections)),
            config,
            listener,
            handler,
            stats: Arc::new(AcceptorStats::default()),
            next_conn_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    #[must_use]
    pub fn stats(&self) -> Arc<AcceptorStats> {
        Arc::clone(&self.stats)
    }

    /// Accept until `shutdown` resolves or the listener fails.
    ///
    /// On the way out the listener is closed, the socket file removed, and
    /// connection tasks get the configured grace period before being aborted.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] for a non-transient accept failure.
    pub async fn run<F>(self, shutdown: F) -> LinkResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            config,
            listener,
            handler,
            slots,
            stats,
            next_conn_id,
        } = self;
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Acceptor stopping");
                    break Ok(());
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
                        // Accepting pauses while every slot is taken.
                        let acquired = tokio::select! {
                            () = &mut shutdown => {
                                info!("Acceptor stopping");
                                break Ok(());
                            }
                            acquired = timeout(config.accept_timeout, Arc::clone(&slots).acquire_owned()) => acquired,
                        };
                        let permit = match acquired {
                            Ok(Ok(permit)) => permit,
                            Ok(Err(_closed)) => continue,
                            Err(_) => {
                                stats.rejected.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    conn_id,
                                    max_connections = config.max_connections,
                                    "No connection slot freed up in time, closing socket"
                                );
                                continue;
                            }
                        };
                        stats.accepted.fetch_add(1, Ordering::Relaxed);
                        stats.active.fetch_add(1, Ordering::Relaxed);
                        debug!(conn_id, "Connection admitted");

                        let slot = Slot {
                            _permit: permit,
                            stats: Arc::clone(&stats),
                        };
                        let transport = Transport::new(stream, config.flavor.framer(), config.transport);
                        let handler = Arc::clone(&handler);
                        connections.spawn(async move {
                            let _slot = slot;
                            handler.handle(conn_id, transport).await;
                        });
                    }
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "Transient accept failure");
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed, stopping acceptor");
                        break Err(LinkError::io("accept failed", e));
                    }
                },
            }
        };

        drop(listener);
        remove_socket_file(&config.path);

        let open = connections.len();
        if open > 0 {
            debug!(open, "Waiting for connection tasks");
            let drained = timeout(config.shutdown_grace, async {
                while connections.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(
                    remaining = connections.len(),
                    "Connection tasks still running after grace period, aborting"
                );
                connections.shutdown().await;
            }
        }

        info!(
            accepted = stats.accepted(),
            rejected = stats.rejected(),
            "Acceptor stopped"
        );
        result
    }
}

/// Held by a connection task for its whole life.
struct Slot {
    _permit: OwnedSemaphorePermit,
    stats: Arc<AcceptorStats>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Make `path` available for binding.
///
/// # Errors
///
/// See [`Acceptor::bind`].
pub async fn prepare_socket_path(path: &Path, flavor: SocketFlavor) -> LinkResult<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(LinkError::io(format!("failed to stat {}", path.display()), e)),
    };

    if !metadata.file_type().is_socket() {
        return Err(LinkError::NotASocket {
            path: path.to_path_buf(),
        });
    }

    match LocalStream::connect(flavor, path).await {
        Ok(_) => Err(LinkError::AddressInUse {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            std::fs::remove_file(path).map_err(|e| {
                LinkError::io(format!("failed to remove stale socket {}", path.display()), e)
            })?;
            info!(path = %path.display(), "Removed stale socket file");
            Ok(())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Socket path answered unexpectedly, refusing to replace it");
            Err(LinkError::AddressInUse {
                path: path.to_path_buf(),
            })
        }
    }
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove socket file"),
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
