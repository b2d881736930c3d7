//! Controller service: wires the IPC server, the optional frame stream,
//! the simulated process and the control loop around one shared
//! controller state, and stops them together.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use equilibria_ipc::{
    ClientRegistry, ControllerHandle, Dispatcher, FrameStreamServer, IpcError, IpcServer,
    TelemetryBroadcaster,
};

use crate::config::ControllerConfig;
use crate::control::ControlLoop;
use crate::process::SimulatedProcess;

pub struct ControllerService {
    config: ControllerConfig,
    state: ControllerHandle,
    process: Arc<SimulatedProcess>,
    broadcaster: Arc<TelemetryBroadcaster>,
    server: IpcServer,
    frames: Option<FrameStreamServer>,
    shutdown: CancellationToken,
}

impl ControllerService {
    /// Bind every listener; nothing runs until [`run`](Self::run).
    pub async fn bind(config: ControllerConfig) -> Result<Self, IpcError> {
        let shutdown = CancellationToken::new();
        let state = ControllerHandle::new();
        let registry = ClientRegistry::new();
        let process = Arc::new(SimulatedProcess::new(state.clone(), config.sensor_presence()));
        let broadcaster = Arc::new(TelemetryBroadcaster::new(
            registry.clone(),
            state.clone(),
            process.clone(),
        ));

        let server_config = config.to_server_config();
        let write_timeout = server_config.write_timeout;
        let server = IpcServer::bind(server_config, Dispatcher::new(state.clone()), registry)
            .await?
            .with_shutdown(shutdown.child_token());

        let frames = match config.frame_addr() {
            Some(addr) => Some(
                FrameStreamServer::bind(&addr, broadcaster.frame_sender(), write_timeout)
                    .await?
                    .with_shutdown(shutdown.child_token()),
            ),
            None => None,
        };

        Ok(Self {
            config,
            state,
            process,
            broadcaster,
            server,
            frames,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        self.server.local_addr()
    }

    pub fn frame_addr(&self) -> Option<Result<SocketAddr, IpcError>> {
        self.frames.as_ref().map(FrameStreamServer::local_addr)
    }

    pub fn state(&self) -> &ControllerHandle {
        &self.state
    }

    /// Cancelling this token stops the whole service.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown; returns once every task has finished.
    pub async fn run(self) -> Result<(), IpcError> {
        let Self {
            config,
            process,
            broadcaster,
            server,
            frames,
            shutdown,
            ..
        } = self;
        let tracker = TaskTracker::new();

        let control = ControlLoop::new(config.tick(), config.publish_interval(), process, broadcaster);
        tracker.spawn(control.run(shutdown.child_token()));

        if let Some(frames) = frames {
            let stop = shutdown.clone();
            tracker.spawn(async move {
                if let Err(e) = frames.run().await {
                    error!("frame stream error: {e}");
                    stop.cancel();
                }
            });
        }

        info!(addr = %server.local_addr()?, "controller service running");
        let result = server.run().await;
        if let Err(e) = &result {
            error!("IPC server error: {e}");
        }

        // Whatever ended the server ends everything else.
        shutdown.cancel();
        tracker.close();
        tracker.wait().await;
        info!("controller service stopped");
        result
    }
}
