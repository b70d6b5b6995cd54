//! Beacon search mission: connect, take off, fly the search plan while the
//! beacon detector watches its line, land on detection or when the plan runs out.

pub mod controller;
pub mod params;

use beacon_fc::{FcError, FlightMode};
use beacon_nav::{GeoError, Route, SearchParameters, SearchPattern, WaypointSource};
use beacon_sense::BeaconError;
use thiserror::Error;

pub use controller::MissionController;
pub use params::MissionParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionState {
    Connecting,
    PreArmWait,
    TakenOff,
    Searching,
    Landing,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessReason {
    PatternComplete,
    BeaconConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Someone else changed the flight mode; the vehicle is theirs now.
    ModeOverride,
    /// Operator stop (Ctrl-C).
    Interrupted,
}

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("autopilot: {0}")]
    Fc(#[from] FcError),
    #[error("beacon: {0}")]
    Beacon(#[from] BeaconError),
    #[error("navigation: {0}")]
    Navigation(#[from] GeoError),
}

#[derive(Debug)]
pub enum Outcome {
    Success(SuccessReason),
    Aborted(AbortReason),
    Error(MissionError),
}

impl Outcome {
    /// Process exit code: 0 unless the mission failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success(_) | Self::Aborted(_) => 0,
            Self::Error(_) => 1,
        }
    }
}

#[derive(Debug)]
pub struct MissionReport {
    pub outcome: Outcome,
    pub history: Vec<MissionState>,
    pub targets_sent: usize,
    /// Mode seen when the search was abandoned to the operator.
    pub override_mode: Option<FlightMode>,
}

/// What to fly once airborne.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Zig-zag fan along the heading the vehicle has when the search starts.
    Pattern(SearchParameters),
    Route(Route),
}

impl Plan {
    pub fn into_source(self, heading_deg: f64) -> Box<dyn WaypointSource> {
        match self {
            Self::Pattern(p) => Box::new(SearchPattern::new(heading_deg, p)),
            Self::Route(r) => Box::new(r.into_source()),
        }
    }
}
