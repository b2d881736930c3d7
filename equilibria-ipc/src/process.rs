//! Types shared with the external process-control collaborator.
//!
//! The control loop owns sensor acquisition and actuator drive; this
//! crate only consumes a [`ProcessState`] snapshot and the fixed
//! [`SensorPresence`] map through the [`ProcessSource`] trait.

use bitflags::bitflags;

// ── SensorPresence ───────────────────────────────────────────────

bitflags! {
    /// One bit per telemetry channel with real hardware behind it.
    ///
    /// Fixed at controller start-up from configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SensorPresence: u16 {
        const TEMP_VAPOUR_HEAD     = 1 << 0;
        const TEMP_BOILER_LIQUID   = 1 << 1;
        const TEMP_PCB_ENVIRONMENT = 1 << 2;
        const PRESSURE_AMBIENT     = 1 << 3;
        const PRESSURE_VAPOUR      = 1 << 4;
        const FLOW                 = 1 << 5;
        const VALVE_REFLUX         = 1 << 6;
        const VALVE_PRODUCT        = 1 << 7;
        const HEATER_1             = 1 << 8;
        const HEATER_2             = 1 << 9;
    }
}

/// Spelling used at the collaborator boundary.
pub type SensorPresenceMap = SensorPresence;

impl Default for SensorPresence {
    fn default() -> Self {
        SensorPresence::all()
    }
}

// ── ProcessMode ──────────────────────────────────────────────────

/// Mode reported by the control loop, carried in the binary frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessMode {
    #[default]
    Idle = 0,
    Startup = 1,
    Active = 2,
    Shutdown = 3,
    Fault = 4,
}

impl TryFrom<u8> for ProcessMode {
    type Error = crate::error::IpcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProcessMode::Idle),
            1 => Ok(ProcessMode::Startup),
            2 => Ok(ProcessMode::Active),
            3 => Ok(ProcessMode::Shutdown),
            4 => Ok(ProcessMode::Fault),
            _ => Err(crate::error::IpcError::InvalidFrame("unknown process mode")),
        }
    }
}

// ── ProcessState ─────────────────────────────────────────────────

/// Raw readings and actuator outputs, refreshed every control tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessState {
    pub mode: ProcessMode,

    pub temp_vapour_head_degc: f32,
    pub temp_boiler_liquid_degc: f32,
    pub temp_pcb_environment_degc: f32,

    pub pressure_ambient_kpa: f32,
    pub pressure_vapour_kpa: f32,

    pub flow_ml_min: f32,

    /// 0-100 %.
    pub valve_reflux_percent: u8,
    pub valve_product_percent: u8,

    /// 0-100 %.
    pub heater_1_percent: u8,
    pub heater_2_percent: u8,

    pub fault_flags: u32,
}

// ── ProcessSource ────────────────────────────────────────────────

/// The view of the control loop that telemetry needs.
///
/// Both calls are made on the publishing thread once per pass and must
/// return promptly.
pub trait ProcessSource: Send + Sync {
    fn snapshot(&self) -> ProcessState;
    fn presence(&self) -> SensorPresence;
}
