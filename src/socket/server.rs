//! TCP server for the line-delimited detection protocol.
//!
//! Binds a listener and spawns one [`ClientConnection`] task per accepted
//! connection. The only state shared between connections is the
//! [`DetectionService`] (and through it the detector).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client_conn::ClientConnection;
use crate::constants::ACCEPT_ERROR_BACKOFF;
use crate::service::DetectionService;

/// Resource limits for the socket server. All are off by default.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Close a connection after this long without receiving bytes.
    pub idle_timeout: Option<Duration>,
    /// Maximum number of connections served at once; further clients wait
    /// in the listen backlog until a slot frees up.
    pub max_connections: Option<usize>,
    /// Maximum frame length in bytes; longer frames close the connection.
    pub max_frame_len: Option<usize>,
}

/// Detection socket server.
///
/// Binds a `TcpListener` and spawns an accept loop that creates
/// [`ClientConnection`] instances for each connection.
#[derive(Debug)]
pub struct SocketServer {
    /// Address the listener is bound to.
    local_addr: SocketAddr,
    /// Cancelled to stop the accept loop and all connections.
    shutdown: CancellationToken,
    /// Handle to the accept loop task.
    accept_handle: JoinHandle<()>,
}

impl SocketServer {
    /// Bind the listener and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(
        addr: SocketAddr,
        service: Arc<DetectionService>,
        options: ServerOptions,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind socket server to {addr}"))?;
        let local_addr = listener.local_addr()?;

        log::info!("[Socket] Listening on {}", local_addr);

        let shutdown = CancellationToken::new();
        let accept_handle = tokio::spawn(Self::accept_loop(
            listener,
            service,
            options,
            shutdown.clone(),
        ));

        Ok(Self {
            local_addr,
            shutdown,
            accept_handle,
        })
    }

    /// Accept loop, runs as a tokio task until shutdown.
    async fn accept_loop(
        listener: TcpListener,
        service: Arc<DetectionService>,
        options: ServerOptions,
        shutdown: CancellationToken,
    ) {
        let slots = options
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));

        loop {
            // Wait for a free slot before accepting so excess clients queue in the backlog
            let permit = match &slots {
                Some(slots) => tokio::select! {
                    () = shutdown.cancelled() => break,
                    permit = Arc::clone(slots).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let client_id = generate_client_id();
                    log::info!("[Socket] Client connected: {} ({})", client_id, peer);

                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("[Socket] Failed to set TCP_NODELAY for {}: {e}", client_id);
                    }

                    let conn = ClientConnection::new(
                        client_id,
                        Arc::clone(&service),
                        &options,
                        shutdown.child_token(),
                    );
                    tokio::spawn(async move {
                        conn.serve(stream).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    log::error!("[Socket] Accept error: {e}");
                    drop(permit);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        log::info!("[Socket] Accept loop stopped");
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close the listener and signal all connections to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.accept_handle.await {
            log::error!("[Socket] Accept loop ended abnormally: {e}");
        }
    }
}

/// Generate a unique client ID using a monotonic counter + random suffix.
fn generate_client_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("conn:{seq:x}{rand:04x}")
}
