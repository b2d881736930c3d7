//! Wire codec: the JSON line envelope, line framing for TCP streams and
//! the fixed-size binary telemetry frame.

pub mod envelope;
pub mod frame;
pub mod lines;

pub use envelope::{Envelope, PROTOCOL_VERSION, decode_line, encode_envelope};
pub use frame::{FRAME_SIZE, FRAME_VERSION, FrameCodec, TelemetryFrame};
pub use lines::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
