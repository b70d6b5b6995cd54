pub mod address;
pub mod autodetect;
pub mod mav;
pub mod mode;
pub mod sim;
pub mod state;

use beacon_proto::GeoPoint;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

pub use address::LinkAddress;
pub use mode::FlightMode;

#[derive(Debug, Error)]
pub enum FcError {
    #[error("link unreachable: {0}")]
    Connection(String),
    #[error("bad link address {0:?}: {1}")]
    Address(String, String),
    #[error("command {0} failed: {1}")]
    Command(&'static str, String),
}

/// Everything the mission needs from the flight controller.
///
/// Commands are fire-and-forget, like the autopilot's own GCS commands: the
/// caller observes their effect through telemetry.
pub trait Autopilot: Send + Sync {
    fn is_armable(&self) -> bool;
    fn arm(&self) -> Result<(), FcError>;
    fn set_mode(&self, mode: FlightMode) -> Result<(), FcError>;
    fn takeoff(&self, altitude_m: f64) -> Result<(), FcError>;
    fn set_groundspeed(&self, mps: f64) -> Result<(), FcError>;
    fn send_position_target(&self, target: &GeoPoint) -> Result<(), FcError>;

    /// Height above ground, metres.
    fn altitude(&self) -> f64;
    fn groundspeed(&self) -> f64;
    /// Degrees, 0 = north.
    fn heading(&self) -> f64;
    fn position(&self) -> GeoPoint;
    fn current_mode(&self) -> Option<FlightMode>;
}

pub trait Connector {
    type Link: Autopilot + 'static;

    fn connect(&self, address: &str) -> Result<Self::Link, FcError>;
}

impl<T: Connector + ?Sized> Connector for Arc<T> {
    type Link = T::Link;

    fn connect(&self, address: &str) -> Result<Self::Link, FcError> {
        (**self).connect(address)
    }
}

impl<T: Autopilot + ?Sized> Autopilot for Arc<T> {
    fn is_armable(&self) -> bool {
        (**self).is_armable()
    }
    fn arm(&self) -> Result<(), FcError> {
        (**self).arm()
    }
    fn set_mode(&self, mode: FlightMode) -> Result<(), FcError> {
        (**self).set_mode(mode)
    }
    fn takeoff(&self, altitude_m: f64) -> Result<(), FcError> {
        (**self).takeoff(altitude_m)
    }
    fn set_groundspeed(&self, mps: f64) -> Result<(), FcError> {
        (**self).set_groundspeed(mps)
    }
    fn send_position_target(&self, target: &GeoPoint) -> Result<(), FcError> {
        (**self).send_position_target(target)
    }
    fn altitude(&self) -> f64 {
        (**self).altitude()
    }
    fn groundspeed(&self) -> f64 {
        (**self).groundspeed()
    }
    fn heading(&self) -> f64 {
        (**self).heading()
    }
    fn position(&self) -> GeoPoint {
        (**self).position()
    }
    fn current_mode(&self) -> Option<FlightMode> {
        (**self).current_mode()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// MAVLink ids we use (companion side).
    pub sys_id: u8,
    pub comp_id: u8,

    /// Target system/component (FC side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// How long one connect attempt waits for the autopilot heartbeat.
    pub heartbeat_timeout_ms: u64,

    /// Companion heartbeat rate.
    pub send_heartbeat_hz: f32,

    /// `auto` address candidates. Example:
    /// ["/dev/serial0","/dev/ttyAMA0","/dev/ttyS0","/dev/ttyUSB0","/dev/ttyACM0"]
    pub candidate_devs: Option<Vec<String>>,
    pub candidate_bauds: Option<Vec<u32>>,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            sys_id: 1,
            comp_id: 191,
            target_sys: 1,
            target_comp: 1,
            heartbeat_timeout_ms: 5000,
            send_heartbeat_hz: 1.0,
            candidate_devs: None,
            candidate_bauds: None,
        }
    }
}
