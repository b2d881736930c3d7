//! Connection manager: the accept loops, per-client tasks and the
//! live-client registry shared with the broadcaster.

pub mod connection;
pub mod frame_stream;
pub mod registry;
pub mod server;

pub use connection::{ConnectionConfig, run_client};
pub use frame_stream::FrameStreamServer;
pub use registry::{ClientHandle, ClientId, ClientRegistry, PublishReport};
pub use server::{DEFAULT_HOST, DEFAULT_PORT, IpcServer, ServerConfig};
