mod controller;

pub use controller::{ControllerHandle, ControllerMode, ControllerState, TargetUpdate};
