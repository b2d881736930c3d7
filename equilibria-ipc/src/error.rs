//! Domain-specific error types for the Equilibria IPC layer.
//!
//! All fallible operations return `Result<T, IpcError>`.
//! Bad client input never panics: every error is typed and is either
//! turned into an `error` ack or terminates the one offending connection.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the controller IPC protocol.
#[derive(Debug, Error)]
pub enum IpcError {
    // ── Framing / Decode Errors ──────────────────────────────────
    /// The line is not a JSON object.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// One of the three envelope fields is absent.
    #[error("missing '{0}' field")]
    MissingField(&'static str),

    /// A single line exceeded the configured maximum.
    #[error("line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    /// A binary telemetry frame could not be parsed.
    #[error("invalid telemetry frame: {0}")]
    InvalidFrame(&'static str),

    // ── Protocol Errors ──────────────────────────────────────────
    /// The envelope `version` is not the supported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    /// The envelope `type` names no known command.
    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    /// A payload field is missing or has the wrong JSON type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A payload field has the right type but a disallowed value.
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// A numeric field lies outside its inclusive range.
    #[error("{field} out of range ({min}-{max}): {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A numeric field that must be non-negative is below zero.
    #[error("{field} cannot be negative: {value}")]
    Negative { field: &'static str, value: f64 },

    // ── Serialization Errors ─────────────────────────────────────
    /// An outbound message could not be serialized.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A socket write did not complete within its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl IpcError {
    /// Returns `true` when the error must terminate the connection it
    /// arrived on instead of being answered with an `error` ack.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::MalformedJson(_) | IpcError::LineTooLong { .. } | IpcError::Connection(_)
        )
    }
}

// ── DecodeError ──────────────────────────────────────────────────

/// Errors produced while decoding a single line into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The line is not a JSON object.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// One of `version`, `type` or `payload` is absent.
    #[error("missing '{0}' field")]
    MissingField(&'static str),
}

impl From<DecodeError> for IpcError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::MalformedJson(msg) => IpcError::MalformedJson(msg),
            DecodeError::MissingField(name) => IpcError::MissingField(name),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::MalformedJson(e.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        IpcError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_the_field() {
        assert!(IpcError::MissingField("version").to_string().contains("version"));
        assert!(
            IpcError::UnsupportedVersion("v9".into())
                .to_string()
                .contains("version")
        );

        let e = IpcError::OutOfRange {
            field: "target_abv",
            value: 150.0,
            min: 0.0,
            max: 100.0,
        };
        assert!(e.to_string().contains("target_abv"));
        assert!(e.to_string().contains("out of range"));
        assert!(e.to_string().contains("150"));

        let e = IpcError::Negative {
            field: "target_flow",
            value: -1.5,
        };
        assert!(e.to_string().contains("cannot be negative"));

        let e = IpcError::InvalidValue {
            field: "mode",
            value: "BOGUS".into(),
        };
        assert_eq!(e.to_string(), "Invalid mode: BOGUS");
    }

    #[test]
    fn decode_error_converts() {
        let e: IpcError = DecodeError::MissingField("payload").into();
        assert!(matches!(e, IpcError::MissingField("payload")));
        assert!(!e.is_fatal());

        let e: IpcError = DecodeError::MalformedJson("eof".into()).into();
        assert!(e.is_fatal());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: IpcError = io_err.into();
        assert!(matches!(e, IpcError::Connection(_)));
        assert!(e.is_fatal());
    }

    #[test]
    fn protocol_errors_are_recoverable() {
        assert!(!IpcError::UnknownCommand("x".into()).is_fatal());
        assert!(!IpcError::InvalidPayload("x".into()).is_fatal());
    }
}
