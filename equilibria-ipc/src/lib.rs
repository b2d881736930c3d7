//! # equilibria-ipc
//!
//! Inter-process communication layer of the Equilibria process controller.
//!
//! This crate contains:
//! - **Codec**: the `v0` JSON line envelope, `LineCodec` for framed TCP I/O
//!   via `tokio_util`, and the 32-byte binary `TelemetryFrame`
//! - **Protocol**: message types, acks and typed command payloads
//! - **Dispatch**: `Dispatcher`, which validates and routes commands
//! - **State**: `ControllerHandle`, the lock-guarded controller state
//! - **Network**: `IpcServer`, per-client tasks and the `ClientRegistry`
//! - **Broadcast**: `TelemetryBroadcaster`, fire-and-forget fan-out
//! - **Process**: the `ProcessSource` collaborator interface
//! - **Error**: `IpcError`, a typed `thiserror` error hierarchy

pub mod broadcast;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod process;
pub mod protocol;
pub mod state;
pub mod telemetry;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use broadcast::TelemetryBroadcaster;
pub use codec::{
    Envelope, FRAME_SIZE, FrameCodec, LineCodec, PROTOCOL_VERSION, TelemetryFrame,
    decode_line, encode_envelope,
};
pub use dispatch::{Dispatcher, Reply};
pub use error::{DecodeError, IpcError};
pub use network::{
    ClientHandle, ClientRegistry, ConnectionConfig, FrameStreamServer, IpcServer, PublishReport, ServerConfig,
};
pub use process::{ProcessMode, ProcessSource, ProcessState, SensorPresence, SensorPresenceMap};
pub use protocol::{Ack, AckStatus, MessageType};
pub use state::{ControllerHandle, ControllerMode, ControllerState, TargetUpdate};
pub use telemetry::TelemetrySample;
