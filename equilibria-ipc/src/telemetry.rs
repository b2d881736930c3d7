//! Telemetry samples pushed to every connected supervisor.
//!
//! A [`TelemetrySample`] is built once per publish pass from the process
//! snapshot, the presence map and the controller state. Channels whose
//! sensor is absent are `None` and serialize as JSON `null`.
//!
//! JSON payload schema (`type: "telemetry"`):
//!
//! ```text
//! {
//!   "timestamp_ms": u64, "mode": "IDLE" | "ACTIVE",
//!   "target_abv": f64, "target_flow": f64,
//!   "temps":     { "vapour_head", "boiler_liquid", "pcb_environment" },
//!   "pressures": { "ambient", "vapour" },
//!   "flow_ml_min": f64 | null,
//!   "valves":    { "reflux_control", "product_takeoff" },
//!   "heaters":   { "heater_1", "heater_2" },
//!   "faults": [bit index, ...],
//!   "sensor_presence": u16
//! }
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use crate::codec::encode_envelope;
use crate::error::IpcError;
use crate::process::{ProcessMode, ProcessState, SensorPresence};
use crate::protocol::MessageType;
use crate::state::{ControllerMode, ControllerState};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Temperatures {
    pub vapour_head: Option<f64>,
    pub boiler_liquid: Option<f64>,
    pub pcb_environment: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pressures {
    pub ambient: Option<f64>,
    pub vapour: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Valves {
    pub reflux_control: Option<u8>,
    pub product_takeoff: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Heaters {
    pub heater_1: Option<u8>,
    pub heater_2: Option<u8>,
}

/// One immutable telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub timestamp_ms: u64,
    pub mode: ControllerMode,
    /// Only carried by the binary frame.
    #[serde(skip)]
    pub process_mode: ProcessMode,
    pub target_abv: f64,
    pub target_flow: f64,
    pub temps: Temperatures,
    pub pressures: Pressures,
    pub flow_ml_min: Option<f64>,
    pub valves: Valves,
    pub heaters: Heaters,
    #[serde(rename = "faults", serialize_with = "serialize_fault_bits")]
    pub fault_flags: u32,
    #[serde(serialize_with = "serialize_presence")]
    pub sensor_presence: SensorPresence,
}

impl TelemetrySample {
    /// Build a sample, masking every channel the presence map marks absent.
    pub fn build(
        timestamp_ms: u64,
        process: &ProcessState,
        presence: SensorPresence,
        controller: &ControllerState,
    ) -> Self {
        let reading = |bit: SensorPresence, value: f32| {
            presence.contains(bit).then(|| round_centi(value))
        };
        let percent = |bit: SensorPresence, value: u8| presence.contains(bit).then_some(value.min(100));

        Self {
            timestamp_ms,
            mode: controller.mode,
            process_mode: process.mode,
            target_abv: controller.target_abv,
            target_flow: controller.target_flow,
            temps: Temperatures {
                vapour_head: reading(SensorPresence::TEMP_VAPOUR_HEAD, process.temp_vapour_head_degc),
                boiler_liquid: reading(
                    SensorPresence::TEMP_BOILER_LIQUID,
                    process.temp_boiler_liquid_degc,
                ),
                pcb_environment: reading(
                    SensorPresence::TEMP_PCB_ENVIRONMENT,
                    process.temp_pcb_environment_degc,
                ),
            },
            pressures: Pressures {
                ambient: reading(SensorPresence::PRESSURE_AMBIENT, process.pressure_ambient_kpa),
                vapour: reading(SensorPresence::PRESSURE_VAPOUR, process.pressure_vapour_kpa),
            },
            flow_ml_min: reading(SensorPresence::FLOW, process.flow_ml_min),
            valves: Valves {
                reflux_control: percent(SensorPresence::VALVE_REFLUX, process.valve_reflux_percent),
                product_takeoff: percent(
                    SensorPresence::VALVE_PRODUCT,
                    process.valve_product_percent,
                ),
            },
            heaters: Heaters {
                heater_1: percent(SensorPresence::HEATER_1, process.heater_1_percent),
                heater_2: percent(SensorPresence::HEATER_2, process.heater_2_percent),
            },
            fault_flags: process.fault_flags,
            sensor_presence: presence,
        }
    }

    /// Encode as a complete `telemetry` envelope line.
    pub fn to_line(&self) -> Result<String, IpcError> {
        encode_envelope(MessageType::Telemetry.as_str(), self)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// `f32` readings widened to `f64` keep their float noise (78.2 becomes
/// 78.19999694824219); two decimals is the sensor resolution anyway.
fn round_centi(value: f32) -> f64 {
    (f64::from(value) * 100.0).round() / 100.0
}

fn serialize_fault_bits<S: Serializer>(flags: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq((0..u32::BITS).filter(|bit| flags & (1 << bit) != 0))
}

fn serialize_presence<S: Serializer>(presence: &SensorPresence, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(presence.bits())
}
