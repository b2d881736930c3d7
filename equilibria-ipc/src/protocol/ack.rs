use serde::{Deserialize, Serialize};

use crate::codec::encode_envelope;
use crate::error::IpcError;
use crate::protocol::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Reply to one command: `{command, status, message?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub command: String,
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: AckStatus::Ok,
            message: None,
        }
    }

    pub fn ok_with(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(command)
        }
    }

    /// Error ack whose message is the error's display text.
    pub fn error(command: impl Into<String>, err: &IpcError) -> Self {
        Self {
            command: command.into(),
            status: AckStatus::Error,
            message: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }

    /// Encode as a complete `ack` envelope line.
    pub fn to_line(&self) -> Result<String, IpcError> {
        encode_envelope(MessageType::Ack.as_str(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_ack_omits_message() {
        let line = Ack::ok("get_telemetry").to_line().unwrap();
        assert_eq!(
            line,
            "{\"version\":\"v0\",\"type\":\"ack\",\"payload\":{\"command\":\"get_telemetry\",\"status\":\"ok\"}}\n"
        );
    }

    #[test]
    fn error_ack_carries_message() {
        let ack = Ack::error("set_mode", &IpcError::InvalidValue {
            field: "mode",
            value: "BOGUS".into(),
        });
        assert!(!ack.is_ok());
        let line = ack.to_line().unwrap();
        assert!(line.contains("\"status\":\"error\""));
        assert!(line.contains("\"message\":\"Invalid mode: BOGUS\""));
    }

    #[test]
    fn ack_deserializes_without_message() {
        let ack: Ack = serde_json::from_str(r#"{"command":"set_targets","status":"ok"}"#).unwrap();
        assert_eq!(ack, Ack::ok("set_targets"));
    }
}
