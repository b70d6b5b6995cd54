use beacon_proto::GeoPoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::mode::FlightMode;
use crate::{Autopilot, Connector, FcError};

/// Where `--connect sim` starts.
pub const SIM_HOME: GeoPoint = GeoPoint::new(53.476033, 9.92989, 0.0);

/// Runs after each accepted position target with the number of targets so far.
pub type TargetHook = Box<dyn Fn(&SimVehicle, usize) + Send + Sync>;

#[derive(Debug, Clone)]
struct SimState {
    armable: bool,
    armed: bool,
    mode: FlightMode,
    position: GeoPoint,
    heading: f64,
    groundspeed: f64,
    speed_setting: f64,
    climb_fraction: f64,
    targets: Vec<GeoPoint>,
    modes: Vec<FlightMode>,
}

/// In-process vehicle that teleports to every target it is given.
///
/// Good enough to drive the mission state machine end to end without an
/// autopilot: commands are recorded so scenarios can assert on them.
pub struct SimVehicle {
    state: Mutex<SimState>,
    on_target: Option<TargetHook>,
}

impl SimVehicle {
    pub fn new(home: GeoPoint) -> Self {
        Self {
            state: Mutex::new(SimState {
                armable: true,
                armed: false,
                mode: FlightMode::Stabilize,
                position: home.with_alt(0.0),
                heading: 0.0,
                groundspeed: 0.0,
                speed_setting: 0.0,
                climb_fraction: 1.0,
                targets: Vec::new(),
                modes: Vec::new(),
            }),
            on_target: None,
        }
    }

    pub fn with_heading(self, heading: f64) -> Self {
        self.state().heading = heading;
        self
    }

    pub fn not_armable(self) -> Self {
        self.state().armable = false;
        self
    }

    /// Takeoff stops at `fraction` of the requested altitude.
    pub fn with_climb_fraction(self, fraction: f64) -> Self {
        self.state().climb_fraction = fraction;
        self
    }

    pub fn on_target(mut self, hook: TargetHook) -> Self {
        self.on_target = Some(hook);
        self
    }

    /// Mode change that did not come from us (RC switch, GCS).
    pub fn set_operator_mode(&self, mode: FlightMode) {
        info!("sim: operator switched to {}", mode);
        self.state().mode = mode;
    }

    pub fn targets(&self) -> Vec<GeoPoint> {
        self.state().targets.clone()
    }

    /// Modes we were commanded into, in order.
    pub fn commanded_modes(&self) -> Vec<FlightMode> {
        self.state().modes.clone()
    }

    pub fn is_armed(&self) -> bool {
        self.state().armed
    }

    pub fn speed_setting(&self) -> f64 {
        self.state().speed_setting
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Autopilot for SimVehicle {
    fn is_armable(&self) -> bool {
        self.state().armable
    }

    fn arm(&self) -> Result<(), FcError> {
        let mut s = self.state();
        if !s.armable {
            return Err(FcError::Command("arm", "pre-arm checks failing".into()));
        }
        s.armed = true;
        Ok(())
    }

    fn set_mode(&self, mode: FlightMode) -> Result<(), FcError> {
        let mut s = self.state();
        s.mode = mode;
        s.modes.push(mode);
        Ok(())
    }

    fn takeoff(&self, altitude_m: f64) -> Result<(), FcError> {
        let mut s = self.state();
        if s.armed && s.mode == FlightMode::Guided {
            s.position.alt = altitude_m * s.climb_fraction;
        }
        Ok(())
    }

    fn set_groundspeed(&self, mps: f64) -> Result<(), FcError> {
        self.state().speed_setting = mps;
        Ok(())
    }

    fn send_position_target(&self, target: &GeoPoint) -> Result<(), FcError> {
        let count = {
            let mut s = self.state();
            s.targets.push(*target);
            if s.mode == FlightMode::Guided {
                s.position = *target;
                s.groundspeed = 0.0;
            }
            s.targets.len()
        };
        debug!("sim: target #{} {}", count, target);
        if let Some(hook) = &self.on_target {
            hook(self, count);
        }
        Ok(())
    }

    fn altitude(&self) -> f64 {
        self.state().position.alt
    }

    fn groundspeed(&self) -> f64 {
        self.state().groundspeed
    }

    fn heading(&self) -> f64 {
        self.state().heading
    }

    fn position(&self) -> GeoPoint {
        self.state().position
    }

    fn current_mode(&self) -> Option<FlightMode> {
        Some(self.state().mode)
    }
}

/// Hands out one shared [`SimVehicle`], optionally after some failed attempts.
pub struct SimConnector {
    vehicle: Arc<SimVehicle>,
    fail_first: usize,
    attempts: AtomicUsize,
}

impl SimConnector {
    pub fn new(vehicle: Arc<SimVehicle>) -> Self {
        Self { vehicle, fail_first: 0, attempts: AtomicUsize::new(0) }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for SimConnector {
    type Link = Arc<SimVehicle>;

    fn connect(&self, address: &str) -> Result<Self::Link, FcError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(FcError::Connection(format!("{}: simulated link down (attempt {})", address, n + 1)));
        }
        Ok(self.vehicle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takeoff_needs_guided_and_armed() {
        let v = SimVehicle::new(SIM_HOME);
        v.takeoff(10.0).unwrap();
        assert_eq!(v.altitude(), 0.0);
        v.set_mode(FlightMode::Guided).unwrap();
        v.arm().unwrap();
        v.takeoff(10.0).unwrap();
        assert_eq!(v.altitude(), 10.0);
    }

    #[test]
    fn targets_move_vehicle_only_in_guided() {
        let v = SimVehicle::new(SIM_HOME);
        let t = GeoPoint::new(53.5, 9.9, 5.0);
        v.send_position_target(&t).unwrap();
        assert_eq!(v.position().lat, SIM_HOME.lat);
        v.set_mode(FlightMode::Guided).unwrap();
        v.send_position_target(&t).unwrap();
        assert_eq!(v.position(), t);
        assert_eq!(v.targets().len(), 2);
    }

    #[test]
    fn operator_mode_is_not_logged_as_commanded() {
        let v = SimVehicle::new(SIM_HOME);
        v.set_mode(FlightMode::Guided).unwrap();
        v.set_operator_mode(FlightMode::Loiter);
        assert_eq!(v.current_mode(), Some(FlightMode::Loiter));
        assert_eq!(v.commanded_modes(), vec![FlightMode::Guided]);
    }

    #[test]
    fn connector_fails_then_succeeds() {
        let c = SimConnector::new(Arc::new(SimVehicle::new(SIM_HOME))).failing_first(2);
        assert!(matches!(c.connect("sim"), Err(FcError::Connection(_))));
        assert!(c.connect("sim").is_err());
        assert!(c.connect("sim").is_ok());
        assert_eq!(c.attempts(), 3);
    }

    #[test]
    fn not_armable_vehicle_refuses_to_arm() {
        let v = SimVehicle::new(SIM_HOME).not_armable();
        assert!(!v.is_armable());
        assert!(matches!(v.arm(), Err(FcError::Command("arm", _))));
    }
}
