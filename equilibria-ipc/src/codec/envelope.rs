//! The versioned JSON envelope carried on every line.
//!
//! ```text
//! {"version":"v0","type":<type>,"payload":<object>}\n
//! ```
//!
//! Escaping of quotes, backslashes and control characters (`\n`, `\r`,
//! `\t`, `\b`, `\f`, `\u00XX`) is done by `serde_json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, IpcError};

/// The only protocol version this controller speaks.
pub const PROTOCOL_VERSION: &str = "v0";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: Value,
}

impl Envelope {
    /// Envelope stamped with [`PROTOCOL_VERSION`].
    pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            msg_type: msg_type.into(),
            payload,
        }
    }

    pub fn is_supported_version(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Borrowing twin of [`Envelope`] so outbound payloads are serialized in
/// place and keys keep their `version, type, payload` order.
#[derive(Serialize)]
struct OutboundEnvelope<'a, P: Serialize> {
    version: &'a str,
    #[serde(rename = "type")]
    msg_type: &'a str,
    payload: &'a P,
}

/// Serialize `payload` into a complete envelope line ending in exactly
/// one `\n`.
pub fn encode_envelope<P: Serialize>(msg_type: &str, payload: &P) -> Result<String, IpcError> {
    let mut line = serde_json::to_string(&OutboundEnvelope {
        version: PROTOCOL_VERSION,
        msg_type,
        payload,
    })?;
    line.push('\n');
    Ok(line)
}

/// Decode one line (without its terminator) into an [`Envelope`].
///
/// The version is not checked here; routing rejects unsupported versions
/// so the client still gets an ack naming the command.
pub fn decode_line(line: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::MalformedJson("expected a JSON object".into()));
    };

    let version = object
        .remove("version")
        .ok_or(DecodeError::MissingField("version"))?;
    let msg_type = object
        .remove("type")
        .ok_or(DecodeError::MissingField("type"))?;
    let payload = object
        .remove("payload")
        .ok_or(DecodeError::MissingField("payload"))?;

    Ok(Envelope {
        version: into_text(version),
        msg_type: into_text(msg_type),
        payload,
    })
}

/// Non-string `version`/`type` values keep their JSON spelling so the
/// resulting error ack can quote them.
fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_has_fixed_key_order_and_newline() {
        let line = encode_envelope("get_telemetry", &json!({})).unwrap();
        assert_eq!(line, "{\"version\":\"v0\",\"type\":\"get_telemetry\",\"payload\":{}}\n");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn decode_reproduces_encoded_envelope() {
        let cases = [
            ("get_telemetry", json!({})),
            ("set_mode", json!({"mode": "ACTIVE"})),
            ("set_targets", json!({"target_abv": 92.5, "target_flow": 250.0})),
        ];
        for (msg_type, payload) in cases {
            let line = encode_envelope(msg_type, &payload).unwrap();
            let envelope = decode_line(line.trim_end()).unwrap();
            assert_eq!(envelope, Envelope::new(msg_type, payload));
        }
    }

    #[test]
    fn missing_fields_are_named() {
        assert_eq!(
            decode_line(r#"{"type":"get_telemetry","payload":{}}"#),
            Err(DecodeError::MissingField("version"))
        );
        assert_eq!(
            decode_line(r#"{"version":"v0","payload":{}}"#),
            Err(DecodeError::MissingField("type"))
        );
        assert_eq!(
            decode_line(r#"{"version":"v0","type":"get_telemetry"}"#),
            Err(DecodeError::MissingField("payload"))
        );
    }

    #[test]
    fn non_objects_are_malformed() {
        for line in ["not json", "[1,2,3]", "\"v0\"", "{\"version\":", ""] {
            assert!(matches!(decode_line(line), Err(DecodeError::MalformedJson(_))), "{line}");
        }
    }

    #[test]
    fn control_characters_are_escaped() {
        let line = encode_envelope("ack", &json!({"message": "a\"b\\c\nd\re\tf\u{8}g\u{c}h\u{1}"})).unwrap();
        assert!(line.contains(r#"a\"b\\c\nd\re\tf\bg\fh\u0001"#));
        // Only the terminator is a raw newline.
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn non_string_version_keeps_json_spelling() {
        let envelope = decode_line(r#"{"version":1,"type":"get_telemetry","payload":{}}"#).unwrap();
        assert_eq!(envelope.version, "1");
        assert!(!envelope.is_supported_version());
    }
}
