//! # equilibria-controller
//!
//! The controller process around the `equilibria-ipc` core:
//! - **Config**: `ControllerConfig`, loaded from TOML with defaults
//! - **Process**: `SimulatedProcess`, the stand-in process collaborator
//! - **Control**: `ControlLoop`, the fixed-rate tick that publishes telemetry
//! - **Service**: `ControllerService`, which wires and stops everything

pub mod config;
pub mod control;
pub mod process;
pub mod service;
