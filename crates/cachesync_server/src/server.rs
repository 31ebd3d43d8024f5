//! Accept loop and server lifecycle.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::session::Session;
use cachesync_store::ItemStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

/// The sync server.
///
/// Owns the authoritative [`ItemStore`] and serves any number of client
/// connections, each in its own task. Mutations go directly through the
/// store handle; connected clients learn of them via push notifications
/// and periodic polling.
///
/// # Example
///
/// ```rust,ignore
/// use cachesync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let store = server.store();
/// let handle = server.bind().await?;
/// store.update(1, "hello");
/// handle.shutdown().await;
/// ```
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<ItemStore>,
}

impl SyncServer {
    /// Creates a server with a fresh, empty store.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(ItemStore::with_feed_capacity(config.feed_capacity));
        Self { config, store }
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ItemStore>) -> Self {
        Self { config, store }
    }

    /// Returns a handle to the store, for mutation and inspection.
    pub fn store(&self) -> Arc<ItemStore> {
        Arc::clone(&self.store)
    }

    /// Binds the listener and spawns the accept loop.
    pub async fn bind(self) -> ServerResult<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "server listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let join = tokio::spawn(run_accept_loop(listener, store, shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            join,
        })
    }
}

/// Handle to a running server: its bound address and shutdown control.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections, closes every live session, and waits
    /// for the accept loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

async fn run_accept_loop(
    listener: TcpListener,
    store: Arc<ItemStore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "connection accepted");
                    let session = Session::new(Arc::clone(&store), peer);
                    sessions.spawn(async move {
                        // Session errors are already logged; a failed
                        // session must not take down the server.
                        let _ = session.run(stream).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            },
            // Reap finished sessions so the set does not grow unbounded.
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            _ = shutdown_rx.changed() => {
                info!("server shutting down");
                sessions.abort_all();
                return;
            }
        }
    }
}
