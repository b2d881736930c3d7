//! TCP accept loop for supervisor connections.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::dispatch::Dispatcher;
use crate::error::IpcError;
use crate::network::connection::{
    ConnectionConfig, DEFAULT_OUTBOUND_QUEUE, DEFAULT_WRITE_TIMEOUT, run_client,
};
use crate::network::registry::ClientRegistry;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7002;

/// Back-off after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// `0` binds an ephemeral port.
    pub port: u16,
    pub outbound_queue: usize,
    pub max_line_length: usize,
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            outbound_queue: self.outbound_queue,
            max_line_length: self.max_line_length,
            write_timeout: self.write_timeout,
        }
    }
}

/// The controller's IPC endpoint.
///
/// Every accepted socket gets its own task holding a child of the
/// server's shutdown token. Cancelling that token closes the listener,
/// cancels every client, and `run` returns once all client tasks ended.
pub struct IpcServer {
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: Dispatcher,
    registry: ClientRegistry,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl IpcServer {
    pub async fn bind(
        config: ServerConfig,
        dispatcher: Dispatcher,
        registry: ClientRegistry,
    ) -> Result<Self, IpcError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self {
            listener,
            config,
            dispatcher,
            registry,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Stop on `token` instead of the server's own token.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown.
    pub async fn run(self) -> Result<(), IpcError> {
        let Self {
            listener,
            config,
            dispatcher,
            registry,
            shutdown,
            tracker,
        } = self;
        let conn_config = config.connection();
        info!(addr = %listener.local_addr()?, "IPC server listening");

        while let Some((stream, peer)) = accept_until(&shutdown, || listener.accept()).await {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(%peer, "failed to set TCP_NODELAY: {e}");
            }

            tracker.spawn(run_client(
                stream,
                peer,
                dispatcher.clone(),
                registry.clone(),
                conn_config,
                shutdown.child_token(),
            ));
        }

        drop(listener);
        registry.close_all();
        tracker.close();
        info!(clients = tracker.len(), "IPC server stopping, waiting for clients");
        tracker.wait().await;
        info!("IPC server stopped");
        Ok(())
    }
}

/// Next successful `accept`, sleeping [`ACCEPT_BACKOFF`] after each
/// failure. `None` once `shutdown` fires.
pub(crate) async fn accept_until<T, F, Fut>(shutdown: &CancellationToken, mut accept: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return None,
            accepted = accept() => accepted,
        };
        match accepted {
            Ok(item) => return Some(item),
            Err(e) => {
                warn!("accept error: {e}");
                tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                }
            }
        }
    }
}
