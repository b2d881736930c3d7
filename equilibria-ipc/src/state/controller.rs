//! Controller state owned by the protocol dispatcher.
//!
//! `ControllerState` is a plain value; `ControllerHandle` is the only way
//! to share it across tasks. Every mutation goes through a validated
//! operation that takes the lock exactly once, so readers never observe
//! a half-applied command.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::IpcError;

/// Inclusive bounds for `target_abv`, in percent.
pub const TARGET_ABV_RANGE: (f64, f64) = (0.0, 100.0);

// ── ControllerMode ───────────────────────────────────────────────

/// Operating mode requested by the supervisor.
///
/// ```text
///   IDLE ◄──── set_mode ────► ACTIVE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControllerMode {
    #[default]
    Idle,
    Active,
}

impl ControllerMode {
    /// Wire spelling used in JSON payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerMode::Idle => "IDLE",
            ControllerMode::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerMode {
    type Err = IpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(ControllerMode::Idle),
            "ACTIVE" => Ok(ControllerMode::Active),
            other => Err(IpcError::InvalidValue {
                field: "mode",
                value: other.to_string(),
            }),
        }
    }
}

// ── ControllerState ──────────────────────────────────────────────

/// Snapshot of the supervisor-controlled state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub mode: ControllerMode,
    /// Target alcohol by volume, percent in `[0, 100]`.
    pub target_abv: f64,
    /// Target product flow, never negative.
    pub target_flow: f64,
}

// ── TargetUpdate ─────────────────────────────────────────────────

/// A `set_targets` request. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetUpdate {
    pub target_abv: Option<f64>,
    pub target_flow: Option<f64>,
}

impl TargetUpdate {
    /// Check every supplied field. Nothing is applied unless all pass.
    pub fn validate(&self) -> Result<(), IpcError> {
        if let Some(abv) = self.target_abv {
            let (min, max) = TARGET_ABV_RANGE;
            if !(min..=max).contains(&abv) {
                return Err(IpcError::OutOfRange {
                    field: "target_abv",
                    value: abv,
                    min,
                    max,
                });
            }
        }
        if let Some(flow) = self.target_flow {
            // `!(>=)` also rejects NaN.
            if !(flow >= 0.0) {
                return Err(IpcError::Negative {
                    field: "target_flow",
                    value: flow,
                });
            }
        }
        Ok(())
    }

    fn apply_to(&self, state: &mut ControllerState) {
        if let Some(abv) = self.target_abv {
            state.target_abv = abv;
        }
        if let Some(flow) = self.target_flow {
            state.target_flow = flow;
        }
    }
}

// ── ControllerHandle ─────────────────────────────────────────────

/// Cloneable, lock-guarded handle to the single `ControllerState`.
///
/// The lock is never held across an `.await` or any I/O.
#[derive(Debug, Clone, Default)]
pub struct ControllerHandle {
    inner: Arc<Mutex<ControllerState>>,
}

impl ControllerHandle {
    /// Fresh state: `{IDLE, 0.0, 0.0}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit state (tests, restored sessions).
    pub fn with_state(state: ControllerState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // The state is plain data; a panicked writer cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> ControllerState {
        *self.lock()
    }

    pub fn current_mode(&self) -> ControllerMode {
        self.lock().mode
    }

    /// Replace the mode, returning the previous one.
    pub fn set_mode(&self, mode: ControllerMode) -> ControllerMode {
        std::mem::replace(&mut self.lock().mode, mode)
    }

    /// Validate and apply a target update as one atomic step.
    ///
    /// Returns the resulting state on success. On failure the state is
    /// unchanged.
    pub fn apply_targets(&self, update: TargetUpdate) -> Result<ControllerState, IpcError> {
        update.validate()?;
        let mut state = self.lock();
        update.apply_to(&mut state);
        Ok(*state)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_idle_and_zeroed() {
        let handle = ControllerHandle::new();
        let state = handle.snapshot();
        assert_eq!(state.mode, ControllerMode::Idle);
        assert_eq!(state.target_abv, 0.0);
        assert_eq!(state.target_flow, 0.0);
    }

    #[test]
    fn mode_parse_and_display() {
        assert_eq!("IDLE".parse::<ControllerMode>().unwrap(), ControllerMode::Idle);
        assert_eq!(
            "ACTIVE".parse::<ControllerMode>().unwrap(),
            ControllerMode::Active
        );
        assert_eq!(ControllerMode::Active.to_string(), "ACTIVE");

        let err = "idle".parse::<ControllerMode>().unwrap_err();
        assert!(err.to_string().contains("Invalid mode"));
    }

    #[test]
    fn set_mode_returns_previous() {
        let handle = ControllerHandle::new();
        assert_eq!(handle.set_mode(ControllerMode::Active), ControllerMode::Idle);
        assert_eq!(handle.current_mode(), ControllerMode::Active);
    }

    #[test]
    fn partial_update_leaves_other_field() {
        let handle = ControllerHandle::new();
        handle
            .apply_targets(TargetUpdate {
                target_abv: Some(92.0),
                target_flow: Some(250.0),
            })
            .unwrap();

        let state = handle
            .apply_targets(TargetUpdate {
                target_abv: None,
                target_flow: Some(300.0),
            })
            .unwrap();
        assert_eq!(state.target_abv, 92.0);
        assert_eq!(state.target_flow, 300.0);
    }

    #[test]
    fn abv_bounds_are_inclusive() {
        for abv in [0.0, 100.0] {
            let update = TargetUpdate {
                target_abv: Some(abv),
                target_flow: None,
            };
            assert!(update.validate().is_ok());
        }
        for abv in [-10.0, 100.01, 150.0, f64::NAN] {
            let update = TargetUpdate {
                target_abv: Some(abv),
                target_flow: None,
            };
            assert!(matches!(
                update.validate(),
                Err(IpcError::OutOfRange { field: "target_abv", .. })
            ));
        }
    }

    #[test]
    fn rejected_update_is_all_or_nothing() {
        let handle = ControllerHandle::new();
        let err = handle
            .apply_targets(TargetUpdate {
                target_abv: Some(50.0),
                target_flow: Some(-1.0),
            })
            .unwrap_err();
        assert!(err.to_string().contains("cannot be negative"));
        assert_eq!(handle.snapshot(), ControllerState::default());
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let handle = ControllerHandle::with_state(ControllerState {
            mode: ControllerMode::Active,
            target_abv: 40.0,
            target_flow: 10.0,
        });
        let state = handle.apply_targets(TargetUpdate::default()).unwrap();
        assert_eq!(state.target_abv, 40.0);
        assert_eq!(state.mode, ControllerMode::Active);
    }

    #[test]
    fn mode_serializes_uppercase() {
        let json = serde_json::to_string(&ControllerMode::Active).unwrap();
        assert_eq!(json, "\"ACTIVE\"");
    }
}
