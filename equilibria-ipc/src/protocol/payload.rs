//! Typed command payloads, parsed from the envelope's JSON payload.
//!
//! Missing fields and wrong JSON types are `InvalidPayload`; values of
//! the right type are checked later by the state layer.

use serde_json::{Map, Value};

use crate::error::IpcError;
use crate::state::{ControllerMode, TargetUpdate};

fn as_object(payload: &Value) -> Result<&Map<String, Value>, IpcError> {
    payload
        .as_object()
        .ok_or_else(|| IpcError::InvalidPayload("payload must be a JSON object".into()))
}

/// Optional numeric field: absent is `None`, anything but a number is an error.
fn optional_number(object: &Map<String, Value>, field: &str) -> Result<Option<f64>, IpcError> {
    match object.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| IpcError::InvalidPayload(format!("'{field}' must be a number"))),
    }
}

// ── set_mode ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetModeRequest {
    pub mode: ControllerMode,
}

impl SetModeRequest {
    pub fn from_payload(payload: &Value) -> Result<Self, IpcError> {
        let object = as_object(payload)?;
        let mode = match object.get("mode") {
            None => return Err(IpcError::InvalidPayload("missing 'mode' in payload".into())),
            Some(Value::String(mode)) => mode.parse()?,
            Some(_) => return Err(IpcError::InvalidPayload("'mode' must be a string".into())),
        };
        Ok(Self { mode })
    }
}

// ── set_targets ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SetTargetsRequest {
    pub target_abv: Option<f64>,
    pub target_flow: Option<f64>,
}

impl SetTargetsRequest {
    pub fn from_payload(payload: &Value) -> Result<Self, IpcError> {
        let object = as_object(payload)?;
        Ok(Self {
            target_abv: optional_number(object, "target_abv")?,
            target_flow: optional_number(object, "target_flow")?,
        })
    }
}

impl From<SetTargetsRequest> for TargetUpdate {
    fn from(req: SetTargetsRequest) -> Self {
        TargetUpdate {
            target_abv: req.target_abv,
            target_flow: req.target_flow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_mode_parses() {
        let req = SetModeRequest::from_payload(&json!({"mode": "ACTIVE"})).unwrap();
        assert_eq!(req.mode, ControllerMode::Active);
    }

    #[test]
    fn set_mode_missing_or_mistyped() {
        let err = SetModeRequest::from_payload(&json!({})).unwrap_err();
        assert!(matches!(err, IpcError::InvalidPayload(_)));
        assert!(err.to_string().contains("mode"));

        let err = SetModeRequest::from_payload(&json!({"mode": 1})).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn set_mode_bad_value() {
        let err = SetModeRequest::from_payload(&json!({"mode": "BOGUS"})).unwrap_err();
        assert!(matches!(err, IpcError::InvalidValue { field: "mode", .. }));
    }

    #[test]
    fn set_targets_fields_are_optional() {
        let req = SetTargetsRequest::from_payload(&json!({"target_flow": 12})).unwrap();
        assert_eq!(req.target_abv, None);
        assert_eq!(req.target_flow, Some(12.0));

        let req = SetTargetsRequest::from_payload(&json!({})).unwrap();
        assert_eq!(req, SetTargetsRequest::default());
    }

    #[test]
    fn set_targets_rejects_non_numbers() {
        let err = SetTargetsRequest::from_payload(&json!({"target_abv": "95"})).unwrap_err();
        assert!(err.to_string().contains("target_abv"));
        assert!(err.to_string().contains("must be a number"));

        let err = SetTargetsRequest::from_payload(&json!({"target_flow": null})).unwrap_err();
        assert!(err.to_string().contains("target_flow"));
    }

    #[test]
    fn payload_must_be_an_object() {
        let err = SetTargetsRequest::from_payload(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }
}
