//! Raw binary telemetry stream.
//!
//! Subscribers receive back-to-back [`TelemetryFrame`]s (`FRAME_SIZE`
//! bytes each) and send nothing. A subscriber that falls behind the
//! broadcast channel skips the frames it missed.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::codec::{FrameCodec, TelemetryFrame};
use crate::error::IpcError;
use crate::network::connection::send_within;
use crate::network::server::accept_until;

pub struct FrameStreamServer {
    listener: TcpListener,
    frames: broadcast::Sender<TelemetryFrame>,
    write_timeout: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl FrameStreamServer {
    pub async fn bind(
        addr: &str,
        frames: broadcast::Sender<TelemetryFrame>,
        write_timeout: Duration,
    ) -> Result<Self, IpcError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            frames,
            write_timeout,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<(), IpcError> {
        info!(addr = %self.listener.local_addr()?, "frame stream listening");

        while let Some((stream, peer)) =
            accept_until(&self.shutdown, || self.listener.accept()).await
        {
            // Subscribe before spawning so the first frame after accept is not missed.
            let frames = self.frames.subscribe();
            self.tracker.spawn(serve_subscriber(
                stream,
                peer,
                frames,
                self.write_timeout,
                self.shutdown.child_token(),
            ));
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("frame stream stopped");
        Ok(())
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut frames: broadcast::Receiver<TelemetryFrame>,
    write_timeout: Duration,
    cancel: CancellationToken,
) {
    info!(%peer, "frame subscriber connected");
    let mut sink = FramedWrite::new(stream, FrameCodec);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => frame,
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(RecvError::Lagged(skipped)) => {
                debug!(%peer, skipped, "frame subscriber lagging");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if let Err(e) = send_within(&mut sink, frame, write_timeout).await {
            match e {
                IpcError::Timeout(_) => warn!(%peer, "frame write failed: {e}"),
                _ => debug!(%peer, "frame write failed: {e}"),
            }
            break;
        }
    }
    info!(%peer, "frame subscriber disconnected");
}
