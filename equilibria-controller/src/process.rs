//! Simulated still, standing in for sensor acquisition and actuator drive.
//!
//! Each control tick moves every reading a fraction of the way toward a
//! set point chosen by the controller mode:
//!
//! ```text
//!  IDLE ──set ACTIVE──► STARTUP ──boiler at temp──► ACTIVE
//!   ▲                                                 │
//!   └──── cooled ◄──── SHUTDOWN ◄────set IDLE─────────┘
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use equilibria_ipc::{
    ControllerHandle, ControllerMode, ProcessMode, ProcessSource, ProcessState, SensorPresence,
};

/// Seconds for a reading to cover ~63% of the gap to its set point.
const TIME_CONSTANT_S: f32 = 5.0;

/// Boiler temperature window counted as "at temperature".
const AT_TEMP_BAND_DEGC: f32 = 1.0;

/// Boiler temperature below which a shutdown is complete.
const COOLED_DEGC: f32 = 40.0;

/// Fallback product flow when the supervisor has not set a target.
const DEFAULT_FLOW_ML_MIN: f32 = 240.0;

/// Where readings settle in one process mode.
#[derive(Debug, Clone, Copy)]
struct SetPoint {
    vapour_head: f32,
    boiler_liquid: f32,
    pcb_environment: f32,
    vapour_kpa: f32,
    flow_ml_min: f32,
    valve_reflux: u8,
    valve_product: u8,
    heater: u8,
}

const COLD: SetPoint = SetPoint {
    vapour_head: 20.0,
    boiler_liquid: 20.0,
    pcb_environment: 30.0,
    vapour_kpa: 0.0,
    flow_ml_min: 0.0,
    valve_reflux: 0,
    valve_product: 0,
    heater: 0,
};

const RUNNING: SetPoint = SetPoint {
    vapour_head: 78.2,
    boiler_liquid: 91.5,
    pcb_environment: 42.1,
    vapour_kpa: 3.4,
    flow_ml_min: DEFAULT_FLOW_ML_MIN,
    valve_reflux: 65,
    valve_product: 30,
    heater: 70,
};

pub struct SimulatedProcess {
    controller: ControllerHandle,
    presence: SensorPresence,
    state: Mutex<ProcessState>,
}

impl SimulatedProcess {
    pub fn new(controller: ControllerHandle, presence: SensorPresence) -> Self {
        let state = ProcessState {
            mode: ProcessMode::Idle,
            temp_vapour_head_degc: COLD.vapour_head,
            temp_boiler_liquid_degc: COLD.boiler_liquid,
            temp_pcb_environment_degc: COLD.pcb_environment,
            pressure_ambient_kpa: 101.3,
            pressure_vapour_kpa: COLD.vapour_kpa,
            ..ProcessState::default()
        };
        Self {
            controller,
            presence,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the simulation by `dt`.
    pub fn step(&self, dt: Duration) {
        let controller = self.controller.snapshot();
        let alpha = (dt.as_secs_f32() / TIME_CONSTANT_S).clamp(0.0, 1.0);
        let mut state = self.lock();

        state.mode = next_mode(state.mode, controller.mode, state.temp_boiler_liquid_degc);

        let mut target = match state.mode {
            ProcessMode::Startup | ProcessMode::Active => RUNNING,
            ProcessMode::Idle | ProcessMode::Shutdown | ProcessMode::Fault => COLD,
        };
        if state.mode == ProcessMode::Active && controller.target_flow > 0.0 {
            target.flow_ml_min = controller.target_flow as f32;
        }
        if state.mode == ProcessMode::Startup {
            // Full heat, no draw-off while coming up to temperature.
            target.heater = 100;
            target.valve_product = 0;
            target.flow_ml_min = 0.0;
        }

        approach(&mut state.temp_vapour_head_degc, target.vapour_head, alpha);
        approach(&mut state.temp_boiler_liquid_degc, target.boiler_liquid, alpha);
        approach(&mut state.temp_pcb_environment_degc, target.pcb_environment, alpha);
        approach(&mut state.pressure_vapour_kpa, target.vapour_kpa, alpha);
        approach(&mut state.flow_ml_min, target.flow_ml_min, alpha);

        // Actuators follow their commands immediately.
        state.valve_reflux_percent = target.valve_reflux;
        state.valve_product_percent = target.valve_product;
        state.heater_1_percent = target.heater;
        state.heater_2_percent = target.heater;
    }
}

impl ProcessSource for SimulatedProcess {
    fn snapshot(&self) -> ProcessState {
        *self.lock()
    }

    fn presence(&self) -> SensorPresence {
        self.presence
    }
}

fn next_mode(current: ProcessMode, commanded: ControllerMode, boiler_degc: f32) -> ProcessMode {
    match (current, commanded) {
        (ProcessMode::Fault, _) => ProcessMode::Fault,
        (ProcessMode::Idle, ControllerMode::Active) => ProcessMode::Startup,
        (ProcessMode::Startup, ControllerMode::Active)
            if (RUNNING.boiler_liquid - boiler_degc).abs() <= AT_TEMP_BAND_DEGC =>
        {
            ProcessMode::Active
        }
        (ProcessMode::Startup | ProcessMode::Active, ControllerMode::Idle) => ProcessMode::Shutdown,
        (ProcessMode::Shutdown, ControllerMode::Active) => ProcessMode::Startup,
        (ProcessMode::Shutdown, ControllerMode::Idle) if boiler_degc < COOLED_DEGC => {
            ProcessMode::Idle
        }
        (mode, _) => mode,
    }
}

fn approach(value: &mut f32, target: f32, alpha: f32) {
    *value += (target - *value) * alpha;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn run(process: &SimulatedProcess, ticks: usize) {
        for _ in 0..ticks {
            process.step(TICK);
        }
    }

    #[test]
    fn starts_cold_and_idle() {
        let process = SimulatedProcess::new(ControllerHandle::new(), SensorPresence::all());
        run(&process, 10);
        let s = process.snapshot();
        assert_eq!(s.mode, ProcessMode::Idle);
        assert_eq!(s.heater_1_percent, 0);
        assert_eq!(s.temp_boiler_liquid_degc, COLD.boiler_liquid);
    }

    #[test]
    fn activation_warms_up_then_runs() {
        let controller = ControllerHandle::new();
        let process = SimulatedProcess::new(controller.clone(), SensorPresence::all());
        controller.set_mode(ControllerMode::Active);

        process.step(TICK);
        let s = process.snapshot();
        assert_eq!(s.mode, ProcessMode::Startup);
        assert_eq!(s.heater_1_percent, 100);

        run(&process, 2_000);
        let s = process.snapshot();
        assert_eq!(s.mode, ProcessMode::Active);
        assert!((s.temp_boiler_liquid_degc - RUNNING.boiler_liquid).abs() < AT_TEMP_BAND_DEGC);
        assert_eq!(s.valve_reflux_percent, 65);
    }

    #[test]
    fn flow_follows_target_when_active() {
        let controller = ControllerHandle::new();
        let process = SimulatedProcess::new(controller.clone(), SensorPresence::all());
        controller.set_mode(ControllerMode::Active);
        controller
            .apply_targets(equilibria_ipc::TargetUpdate {
                target_abv: None,
                target_flow: Some(120.0),
            })
            .unwrap();

        run(&process, 3_000);
        assert!((process.snapshot().flow_ml_min - 120.0).abs() < 1.0);
    }

    #[test]
    fn going_idle_shuts_down_then_cools() {
        let controller = ControllerHandle::new();
        let process = SimulatedProcess::new(controller.clone(), SensorPresence::all());
        controller.set_mode(ControllerMode::Active);
        run(&process, 2_000);

        controller.set_mode(ControllerMode::Idle);
        process.step(TICK);
        assert_eq!(process.snapshot().mode, ProcessMode::Shutdown);
        assert_eq!(process.snapshot().heater_2_percent, 0);

        run(&process, 2_000);
        assert_eq!(process.snapshot().mode, ProcessMode::Idle);
    }

    #[test]
    fn presence_is_fixed() {
        let presence = SensorPresence::TEMP_VAPOUR_HEAD | SensorPresence::FLOW;
        let process = SimulatedProcess::new(ControllerHandle::new(), presence);
        run(&process, 5);
        assert_eq!(process.presence(), presence);
    }
}
