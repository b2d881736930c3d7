//! One supervisor connection: a reader loop feeding the dispatcher and a
//! writer task draining the connection's outbound queue.
//!
//! ```text
//!            ┌──────────── Framed<S, LineCodec> ────────────┐
//!  socket ──►│ SplitStream ─► reader loop ─► Dispatcher      │
//!            │                    │ ack                      │
//!            │                    ▼                          │
//!  socket ◄──│ SplitSink ◄── writer task ◄── mpsc<Bytes> ◄───┼── broadcaster
//!            └───────────────────────────────────────────────┘
//! ```
//!
//! Acks and telemetry share the queue, so acks leave in command order.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
use crate::dispatch::Dispatcher;
use crate::error::IpcError;
use crate::network::registry::{ClientHandle, ClientId, ClientRegistry};

pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Depth of the outbound queue before the client is dropped.
    pub outbound_queue: usize,
    pub max_line_length: usize,
    /// Longest a single socket write may take.
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Serve one connection until EOF, a read error, a protocol violation,
/// eviction by the broadcaster, or `cancel`.
///
/// The client is registered for telemetry on entry and deregistered
/// before this returns.
pub async fn run_client<S>(
    stream: S,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    registry: ClientRegistry,
    config: ConnectionConfig,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = registry.next_id();
    let (tx, rx) = mpsc::channel::<Bytes>(config.outbound_queue.max(1));
    let codec = LineCodec::with_max_length(config.max_line_length);
    let (sink, mut lines) = Framed::new(stream, codec).split();

    registry.register(ClientHandle::new(id, peer, tx.clone(), cancel.clone()));
    info!(client = id, %peer, "client connected");

    let writer = tokio::spawn(write_loop(id, sink, rx, cancel.clone(), config.write_timeout));

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(client = id, "connection cancelled");
                break;
            }
            next = lines.next() => next,
        };

        let reply = match next {
            None => {
                debug!(client = id, "peer closed the connection");
                break;
            }
            Some(Ok(line)) => dispatcher.handle_line(&line),
            Some(Err(IpcError::Connection(e))) => {
                debug!(client = id, "read error: {e}");
                break;
            }
            Some(Err(e)) => dispatcher.reject(&e),
        };

        if let Some(bytes) = reply.to_bytes() {
            if tx.send(bytes).await.is_err() {
                break;
            }
        }
        if reply.close {
            warn!(client = id, %peer, "protocol violation, closing connection");
            break;
        }
    }

    // Once every sender is gone the writer flushes what is queued
    // (including a final error ack) and shuts the socket down.
    registry.deregister(id);
    drop(tx);
    drop(lines);
    if let Err(e) = writer.await {
        warn!(client = id, "writer task failed: {e}");
    }
    info!(client = id, %peer, "client disconnected");
}

async fn write_loop<W>(
    id: ClientId,
    mut sink: W,
    mut rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    write_timeout: Duration,
) where
    W: Sink<Bytes, Error = IpcError> + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        if let Err(e) = send_within(&mut sink, line, write_timeout).await {
            match e {
                IpcError::Timeout(_) => warn!(client = id, "write failed: {e}"),
                _ => debug!(client = id, "write failed: {e}"),
            }
            cancel.cancel();
            return;
        }
    }

    if tokio::time::timeout(write_timeout, sink.close()).await.is_err() {
        debug!(client = id, "shutdown timed out");
    }
}

/// Send one item, failing with [`IpcError::Timeout`] if the peer stops
/// reading for longer than `limit`.
pub(crate) async fn send_within<W, T>(sink: &mut W, item: T, limit: Duration) -> Result<(), IpcError>
where
    W: Sink<T, Error = IpcError> + Unpin,
{
    tokio::time::timeout(limit, sink.send(item))
        .await
        .map_err(|_| IpcError::Timeout(limit))?
}
