//! Fixed-layout binary telemetry frame.
//!
//! ## Wire format (little-endian, no padding, 32 bytes)
//!
//! ```text
//! offset  size  field
//!  0      1     version            (FRAME_VERSION)
//!  1      8     timestamp_ms       u64
//!  9      1     mode               u8  (ProcessMode)
//! 10      2     temp_vapour_head   i16 °C  ×100, i16::MAX = absent
//! 12      2     temp_boiler_liquid i16 °C  ×100, i16::MAX = absent
//! 14      2     temp_pcb_env       i16 °C  ×100, i16::MAX = absent
//! 16      2     pressure_ambient   i16 kPa ×100, i16::MAX = absent
//! 18      2     pressure_vapour    i16 kPa ×100, i16::MAX = absent
//! 20      2     flow_ml_min        u16 ×10,      u16::MAX = absent
//! 22      1     valve_reflux       u8  %,        u8::MAX  = absent
//! 23      1     valve_product      u8  %,        u8::MAX  = absent
//! 24      1     heater_1           u8  %,        u8::MAX  = absent
//! 25      1     heater_2           u8  %,        u8::MAX  = absent
//! 26      4     faults             u32 bitmask
//! 30      2     sensor_presence    u16 bitmap
//! ```
//!
//! Present readings are clamped one step short of the sentinel, so a real
//! value can never decode as "absent".

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::IpcError;
use crate::process::{ProcessMode, SensorPresence};
use crate::telemetry::TelemetrySample;

/// Layout version in byte 0.
pub const FRAME_VERSION: u8 = 1;

/// Encoded size on the wire.
pub const FRAME_SIZE: usize = 32;

const _: () = assert!(FRAME_SIZE <= 64, "telemetry frame must fit one IPC frame");

pub const SENTINEL_I16: i16 = i16::MAX;
pub const SENTINEL_U16: u16 = u16::MAX;
pub const SENTINEL_U8: u8 = u8::MAX;

/// Temperatures and pressures are sent in hundredths.
pub const READING_SCALE: f64 = 100.0;
/// Flow is sent in tenths of ml/min.
pub const FLOW_SCALE: f64 = 10.0;

/// Raw, already-scaled frame fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub version: u8,
    pub timestamp_ms: u64,
    pub mode: u8,
    /// vapour head, boiler liquid, PCB environment.
    pub temps: [i16; 3],
    /// ambient, vapour.
    pub pressures: [i16; 2],
    pub flow: u16,
    /// reflux control, product take-off.
    pub valves: [u8; 2],
    pub heaters: [u8; 2],
    pub faults: u32,
    pub sensor_presence: u16,
}

impl TelemetryFrame {
    /// Scale a sample into frame units.
    pub fn from_sample(sample: &TelemetrySample) -> Self {
        Self {
            version: FRAME_VERSION,
            timestamp_ms: sample.timestamp_ms,
            mode: sample.process_mode as u8,
            temps: [
                scale_i16(sample.temps.vapour_head),
                scale_i16(sample.temps.boiler_liquid),
                scale_i16(sample.temps.pcb_environment),
            ],
            pressures: [
                scale_i16(sample.pressures.ambient),
                scale_i16(sample.pressures.vapour),
            ],
            flow: scale_u16(sample.flow_ml_min),
            valves: [
                percent_u8(sample.valves.reflux_control),
                percent_u8(sample.valves.product_takeoff),
            ],
            heaters: [
                percent_u8(sample.heaters.heater_1),
                percent_u8(sample.heaters.heater_2),
            ],
            faults: sample.fault_flags,
            sensor_presence: sample.sensor_presence.bits(),
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = self.version;
        buf[1..9].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[9] = self.mode;
        for (i, t) in self.temps.iter().enumerate() {
            let at = 10 + i * 2;
            buf[at..at + 2].copy_from_slice(&t.to_le_bytes());
        }
        for (i, p) in self.pressures.iter().enumerate() {
            let at = 16 + i * 2;
            buf[at..at + 2].copy_from_slice(&p.to_le_bytes());
        }
        buf[20..22].copy_from_slice(&self.flow.to_le_bytes());
        buf[22..24].copy_from_slice(&self.valves);
        buf[24..26].copy_from_slice(&self.heaters);
        buf[26..30].copy_from_slice(&self.faults.to_le_bytes());
        buf[30..32].copy_from_slice(&self.sensor_presence.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, IpcError> {
        let data: &[u8; FRAME_SIZE] = data
            .get(..FRAME_SIZE)
            .and_then(|head| head.try_into().ok())
            .ok_or(IpcError::InvalidFrame("frame too short"))?;
        if data[0] != FRAME_VERSION {
            return Err(IpcError::InvalidFrame("unsupported frame version"));
        }

        let i16_at = |at: usize| i16::from_le_bytes([data[at], data[at + 1]]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&data[1..9]);

        Ok(Self {
            version: data[0],
            timestamp_ms: u64::from_le_bytes(timestamp),
            mode: data[9],
            temps: [i16_at(10), i16_at(12), i16_at(14)],
            pressures: [i16_at(16), i16_at(18)],
            flow: u16::from_le_bytes([data[20], data[21]]),
            valves: [data[22], data[23]],
            heaters: [data[24], data[25]],
            faults: u32::from_le_bytes([data[26], data[27], data[28], data[29]]),
            sensor_presence: u16::from_le_bytes([data[30], data[31]]),
        })
    }

    // ── Unscaled views ───────────────────────────────────────────

    pub fn process_mode(&self) -> Result<ProcessMode, IpcError> {
        ProcessMode::try_from(self.mode)
    }

    pub fn presence(&self) -> SensorPresence {
        SensorPresence::from_bits_truncate(self.sensor_presence)
    }

    /// Temperatures in °C, `None` where the sensor is absent.
    pub fn temps_degc(&self) -> [Option<f64>; 3] {
        self.temps.map(unscale_i16)
    }

    /// Pressures in kPa, `None` where the sensor is absent.
    pub fn pressures_kpa(&self) -> [Option<f64>; 2] {
        self.pressures.map(unscale_i16)
    }

    pub fn flow_ml_min(&self) -> Option<f64> {
        (self.flow != SENTINEL_U16).then(|| f64::from(self.flow) / FLOW_SCALE)
    }

    pub fn valves_percent(&self) -> [Option<u8>; 2] {
        self.valves.map(unpercent_u8)
    }

    pub fn heaters_percent(&self) -> [Option<u8>; 2] {
        self.heaters.map(unpercent_u8)
    }
}

// ── Scaling helpers ──────────────────────────────────────────────

/// `value × 100`, rounded, clamped to `[i16::MIN, i16::MAX - 1]`.
/// Non-finite readings encode as absent, as they do in JSON.
pub fn scale_i16(value: Option<f64>) -> i16 {
    match value.filter(|v| v.is_finite()) {
        Some(v) => {
            let scaled = (v * READING_SCALE).round();
            scaled.clamp(f64::from(i16::MIN), f64::from(SENTINEL_I16 - 1)) as i16
        }
        None => SENTINEL_I16,
    }
}

pub fn unscale_i16(raw: i16) -> Option<f64> {
    (raw != SENTINEL_I16).then(|| f64::from(raw) / READING_SCALE)
}

/// `value × 10`, rounded, clamped to `[0, u16::MAX - 1]`.
/// Non-finite readings encode as absent.
pub fn scale_u16(value: Option<f64>) -> u16 {
    match value.filter(|v| v.is_finite()) {
        Some(v) => {
            let scaled = (v * FLOW_SCALE).round();
            scaled.clamp(0.0, f64::from(SENTINEL_U16 - 1)) as u16
        }
        None => SENTINEL_U16,
    }
}

fn percent_u8(value: Option<u8>) -> u8 {
    value.map_or(SENTINEL_U8, |v| v.min(100))
}

fn unpercent_u8(raw: u8) -> Option<u8> {
    (raw != SENTINEL_U8).then_some(raw)
}

// ── FrameCodec ───────────────────────────────────────────────────

/// Framing for a raw stream of back-to-back [`TelemetryFrame`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = TelemetryFrame;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_SIZE {
            src.reserve(FRAME_SIZE - src.len());
            return Ok(None);
        }
        let frame = TelemetryFrame::decode(&src[..FRAME_SIZE])?;
        src.advance(FRAME_SIZE);
        Ok(Some(frame))
    }
}

impl Encoder<TelemetryFrame> for FrameCodec {
    type Error = IpcError;

    fn encode(&mut self, item: TelemetryFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}
