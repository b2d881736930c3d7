//! Protocol message types.
//!
//! Unknown `type` strings become `IpcError::UnknownCommand`.

use std::fmt;

use crate::error::IpcError;

/// Every `type` value that may appear in an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // ── Inbound (supervisor → controller) ────────────────────────
    GetTelemetry,
    SetMode,
    SetTargets,

    // ── Outbound (controller → supervisor) ───────────────────────
    Telemetry,
    Ack,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::GetTelemetry => "get_telemetry",
            MessageType::SetMode => "set_mode",
            MessageType::SetTargets => "set_targets",
            MessageType::Telemetry => "telemetry",
            MessageType::Ack => "ack",
        }
    }

    /// Returns `true` for types a client may send.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            MessageType::GetTelemetry | MessageType::SetMode | MessageType::SetTargets
        )
    }

    /// Parse an inbound `type`, rejecting anything that is not a command.
    pub fn command(value: &str) -> Result<Self, IpcError> {
        match MessageType::try_from(value) {
            Ok(t) if t.is_command() => Ok(t),
            _ => Err(IpcError::UnknownCommand(value.to_string())),
        }
    }
}

impl TryFrom<&str> for MessageType {
    type Error = IpcError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "get_telemetry" => Ok(MessageType::GetTelemetry),
            "set_mode" => Ok(MessageType::SetMode),
            "set_targets" => Ok(MessageType::SetTargets),
            "telemetry" => Ok(MessageType::Telemetry),
            "ack" => Ok(MessageType::Ack),
            other => Err(IpcError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_roundtrip() {
        for t in [
            MessageType::GetTelemetry,
            MessageType::SetMode,
            MessageType::SetTargets,
            MessageType::Telemetry,
            MessageType::Ack,
        ] {
            assert_eq!(MessageType::try_from(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn outbound_types_are_not_commands() {
        assert!(matches!(
            MessageType::command("telemetry"),
            Err(IpcError::UnknownCommand(_))
        ));
        assert!(MessageType::command("ack").is_err());
        assert_eq!(
            MessageType::command("set_mode").unwrap(),
            MessageType::SetMode
        );
    }

    #[test]
    fn unknown_type_is_named() {
        let err = MessageType::command("reboot").unwrap_err();
        assert!(err.to_string().contains("reboot"));
    }
}
