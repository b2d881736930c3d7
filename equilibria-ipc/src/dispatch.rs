//! Protocol dispatcher: validates envelopes, routes commands and turns
//! every outcome into an ack.
//!
//! ```text
//!  line ──► decode_line ──► version check ──► route by type ──► Ack
//!              │                  │                 │
//!              └── MalformedJson ─┴─ error ack ◄────┘
//!                  (close)
//! ```

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::codec::{Envelope, decode_line};
use crate::error::IpcError;
use crate::protocol::{Ack, MessageType, SetModeRequest, SetTargetsRequest};
use crate::state::ControllerHandle;

/// Command name used in acks for lines that never yielded a `type`.
pub const UNKNOWN_COMMAND: &str = "unknown";

/// What a connection should do with one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub ack: Ack,
    /// The connection must be closed once the ack has been attempted.
    pub close: bool,
}

impl Reply {
    fn answer(ack: Ack) -> Self {
        Self { ack, close: false }
    }

    /// The ack as an encoded envelope line, ready for the outbound queue.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self.ack.to_line() {
            Ok(line) => Some(Bytes::from(line)),
            Err(e) => {
                warn!(command = %self.ack.command, "failed to encode ack: {e}");
                None
            }
        }
    }
}

/// Routes commands to the shared controller state.
///
/// Cheap to clone; every clone mutates the same [`ControllerHandle`].
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    state: ControllerHandle,
}

impl Dispatcher {
    pub fn new(state: ControllerHandle) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ControllerHandle {
        &self.state
    }

    /// Decode and dispatch one complete line.
    pub fn handle_line(&self, line: &str) -> Reply {
        match decode_line(line) {
            Ok(envelope) => Reply::answer(self.dispatch(&envelope)),
            // MalformedJson is fatal, MissingField is answered.
            Err(e) => self.reject(&IpcError::from(e)),
        }
    }

    /// Answer an error raised before an envelope could be decoded.
    pub fn reject(&self, err: &IpcError) -> Reply {
        debug!("rejecting line: {err}");
        Reply {
            ack: Ack::error(UNKNOWN_COMMAND, err),
            close: err.is_fatal(),
        }
    }

    /// Route a decoded envelope. Never fails: errors become `error` acks.
    pub fn dispatch(&self, envelope: &Envelope) -> Ack {
        let command = envelope.msg_type.as_str();
        match self.route(envelope) {
            Ok(ack) => ack,
            Err(e) => {
                debug!(command, "command rejected: {e}");
                Ack::error(command, &e)
            }
        }
    }

    fn route(&self, envelope: &Envelope) -> Result<Ack, IpcError> {
        if !envelope.is_supported_version() {
            return Err(IpcError::UnsupportedVersion(envelope.version.clone()));
        }

        match MessageType::command(&envelope.msg_type)? {
            MessageType::GetTelemetry => Ok(Ack::ok(MessageType::GetTelemetry.as_str())),
            MessageType::SetMode => self.set_mode(envelope),
            MessageType::SetTargets => self.set_targets(envelope),
            // `command()` only yields inbound types.
            other => Err(IpcError::UnknownCommand(other.as_str().to_string())),
        }
    }

    fn set_mode(&self, envelope: &Envelope) -> Result<Ack, IpcError> {
        let req = SetModeRequest::from_payload(&envelope.payload)?;
        let previous = self.state.set_mode(req.mode);
        if previous != req.mode {
            info!(from = %previous, to = %req.mode, "controller mode changed");
        }
        Ok(Ack::ok_with(
            MessageType::SetMode.as_str(),
            format!("mode set to {}", req.mode),
        ))
    }

    fn set_targets(&self, envelope: &Envelope) -> Result<Ack, IpcError> {
        let req = SetTargetsRequest::from_payload(&envelope.payload)?;
        let state = self.state.apply_targets(req.into())?;
        debug!(
            target_abv = state.target_abv,
            target_flow = state.target_flow,
            "targets updated"
        );
        Ok(Ack::ok_with(MessageType::SetTargets.as_str(), "targets updated"))
    }
}
