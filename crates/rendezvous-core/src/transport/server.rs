//! Listening side of the transport.
//!
//! One acceptor task per listening service hands every accepted stream to its
//! own spawned worker task. Accepting and handling are decoupled, so a slow
//! handler never blocks new accepts.
//!
//! # Worker pool
//!
//! With [`ConnectionLimit::Unbounded`] (the default) there is one worker per
//! simultaneous connection, no queue and no backpressure. A flood of idle
//! connections therefore holds one task and one socket each until the peer
//! goes away or the server stops. Use [`ConnectionLimit::Max`] to cap it.

use super::connection::Connection;
use crate::config::{ConnectionLimit, ServerConfig};
use crate::protocol::{peek, CallResponse, TypedMessage};
use crate::{RendezvousError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Handles one accepted connection.
///
/// The transport closes the connection after `handle` returns, so
/// implementations only read the request and write the response.
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, connection: &mut Connection);
}

/// Handle to a running listener. Dropping it stops the listener.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    active_connections: Arc<AtomicUsize>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Get the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The bound port; the OS-assigned one when the configured port was 0.
    pub fn bound_port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections currently being handled.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Close the listening socket and signal workers.
    ///
    /// Workers still waiting for their request give up; workers already
    /// handling one run to completion.
    pub async fn stop(&mut self) {
        self.signal_shutdown();
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Accept loop for {} ended abnormally: {}", self.addr, e);
            }
        }
    }

    fn signal_shutdown(&mut self) {
        // Signal accept loop to stop
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Signal all connection handlers to close
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.signal_shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Decrements the active-connection count when a worker ends, even by panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server-side transport.
pub struct ServerTransport;

impl ServerTransport {
    /// Bind `config.host:config.port` and start accepting.
    ///
    /// Failing to bind is the only fatal error; everything after that is
    /// logged per connection.
    pub async fn start<H: ConnectionHandler>(
        config: &ServerConfig,
        handler: Arc<H>,
    ) -> Result<ServerHandle> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| RendezvousError::Connection {
                message: format!("Failed to bind {}:{}", config.host, config.port),
                source: Some(e),
            })?;
        let addr = listener.local_addr()?;

        info!("Server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            handler,
            config.max_connections,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections.clone(),
        ));

        Ok(ServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            active_connections,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop<H: ConnectionHandler>(
        listener: TcpListener,
        handler: Arc<H>,
        limit: ConnectionLimit,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        let addr = listener.local_addr().ok();
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Server on {:?} shutting down", addr);
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if !limit.admits(current) {
                                warn!(
                                    "Rejecting connection from {}: at max capacity ({:?})",
                                    peer_addr, limit
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let guard = ActiveGuard(active_connections.clone());
                            let handler = handler.clone();
                            let conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                let _guard = guard;
                                debug!("Accepted connection from {}", peer_addr);
                                Self::handle_connection(stream, &*handler, conn_shutdown).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection<H: ConnectionHandler>(
        stream: TcpStream,
        handler: &H,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut connection = match Connection::accepted(stream, shutdown_rx) {
            Ok(connection) => connection,
            Err(e) => {
                error!("Error handling connection: {}", e);
                return;
            }
        };
        handler.handle(&mut connection).await;
        connection.close().await;
    }
}

/// Answer a request this service cannot serve with a generic error response.
///
/// The request's `traceId` is copied when it can be read, even if the `type`
/// is outside the known table. Text that is not a JSON object gets no reply.
pub(crate) async fn reject(connection: &mut Connection, frame: &str, reason: &str) -> Result<()> {
    let header = match peek(frame) {
        Ok(header) => header,
        Err(e) => {
            warn!(
                "Dropping unreadable frame from {}: {}",
                connection.peer_addr(),
                e
            );
            return Ok(());
        }
    };

    let mut response = CallResponse::error(reason);
    if let Some(trace_id) = header.trace_id.as_deref() {
        response = response.in_reply_to(trace_id);
    }
    connection.send(&response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CallRequest;
    use crate::transport::ClientTransport;
    use tokio::sync::Mutex;

    /// Answers each request with its function name.
    struct EchoHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ConnectionHandler for EchoHandler {
        async fn handle(&self, connection: &mut Connection) {
            let request: CallRequest = match connection.receive().await {
                Ok(request) => request,
                Err(_) => return,
            };
            self.seen.lock().await.push(request.function_name.clone());
            let response = CallResponse::success(request.function_name.clone().into())
                .in_reply_to(request.envelope.trace_id.as_str());
            let _ = connection.send(&response).await;
        }
    }

    fn echo() -> Arc<EchoHandler> {
        Arc::new(EchoHandler {
            seen: Mutex::new(Vec::new()),
        })
    }

    async fn call(port: u16, name: &str) -> CallResponse {
        let mut connection = ClientTransport::new()
            .connect("127.0.0.1", port)
            .await
            .unwrap();
        connection.send(&CallRequest::new(name, vec![])).await.unwrap();
        let response = connection.receive().await.unwrap();
        connection.close().await;
        response
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let mut handle = ServerTransport::start(&ServerConfig::new("127.0.0.1", 0), echo())
            .await
            .unwrap();

        assert!(handle.bound_port() > 0);
        assert_eq!(handle.local_addr().ip(), std::net::Ipv4Addr::LOCALHOST);
        assert!(handle.is_running());

        handle.stop().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_each_connection_handled_once() {
        let handler = echo();
        let mut handle = ServerTransport::start(&ServerConfig::new("127.0.0.1", 0), handler.clone())
            .await
            .unwrap();

        let first = call(handle.bound_port(), "a").await;
        let second = call(handle.bound_port(), "b").await;
        assert_eq!(first.result, serde_json::json!("a"));
        assert_eq!(second.result, serde_json::json!("b"));
        assert_eq!(*handler.seen.lock().await, vec!["a", "b"]);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let mut handle = ServerTransport::start(&ServerConfig::new("127.0.0.1", 0), echo())
            .await
            .unwrap();
        let port = handle.bound_port();
        handle.stop().await;

        let result = ClientTransport::new().connect("127.0.0.1", port).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let handle = ServerTransport::start(&ServerConfig::new("127.0.0.1", 0), echo())
            .await
            .unwrap();
        let taken = ServerConfig::new("127.0.0.1", handle.bound_port());

        let result = ServerTransport::start(&taken, echo()).await;
        assert!(matches!(result, Err(RendezvousError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_connection_limit_rejects_excess() {
        let config = ServerConfig::new("127.0.0.1", 0).with_max_connections(ConnectionLimit::Max(1));
        let mut handle = ServerTransport::start(&config, echo()).await.unwrap();
        let port = handle.bound_port();

        // Hold one connection open without sending a request.
        let _idle = ClientTransport::new().connect("127.0.0.1", port).await.unwrap();
        for _ in 0..50 {
            if handle.active_connections() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.active_connections(), 1);

        let mut rejected = ClientTransport::new().connect("127.0.0.1", port).await.unwrap();
        let err = rejected.receive_raw().await.unwrap_err();
        assert!(err.is_connection());

        handle.stop().await;
    }
}
