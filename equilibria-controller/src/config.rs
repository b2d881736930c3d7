//! Configuration for the controller service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use equilibria_ipc::network::connection::DEFAULT_WRITE_TIMEOUT;
use equilibria_ipc::{SensorPresence, ServerConfig};

/// Bounds for the control tick.
pub const MIN_TICK_MS: u64 = 10;
pub const MAX_TICK_MS: u64 = 1000;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// IPC endpoint settings.
    pub network: NetworkConfig,
    /// Control loop and telemetry cadence.
    pub telemetry: TelemetryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind. Keep it on loopback: the protocol is unauthenticated.
    pub host: String,
    /// TCP port for the JSON line protocol.
    pub port: u16,
    /// TCP port for the binary frame stream (0 = disabled).
    pub frame_port: u16,
    /// Messages queued per client before it is dropped.
    pub outbound_queue: usize,
    /// Longest accepted request line, in bytes.
    pub max_line_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Milliseconds between telemetry publishes.
    pub interval_ms: u64,
    /// Milliseconds between control ticks.
    pub tick_ms: u64,
    /// Installed sensors, one bit per channel (see `SensorPresence`).
    pub sensor_presence: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
            frame_port: 0,
            outbound_queue: server.outbound_queue,
            max_line_length: server.max_line_length,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            tick_ms: 100,
            sensor_presence: SensorPresence::all().bits(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ControllerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Settings for the IPC server.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.network.host.clone(),
            port: self.network.port,
            outbound_queue: self.network.outbound_queue.max(1),
            max_line_length: self.network.max_line_length.max(256),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Bind address of the frame stream, if enabled.
    pub fn frame_addr(&self) -> Option<String> {
        (self.network.frame_port != 0)
            .then(|| format!("{}:{}", self.network.host, self.network.frame_port))
    }

    /// Unknown bits are ignored.
    pub fn sensor_presence(&self) -> SensorPresence {
        SensorPresence::from_bits_truncate(self.telemetry.sensor_presence)
    }

    /// Control tick, clamped to `MIN_TICK_MS..=MAX_TICK_MS`.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.telemetry.tick_ms.clamp(MIN_TICK_MS, MAX_TICK_MS))
    }

    /// Publish interval, never shorter than one tick.
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.interval_ms).max(self.tick())
    }
}

// ── Tests ────────────────────────────────────────────────────────
