pub mod doctor;
pub mod geodesy;
pub mod pattern;
pub mod route;

use beacon_proto::GeoPoint;
use serde::{Deserialize, Serialize};

pub use geodesy::{destination, inverse, GeoError, Inverse};
pub use pattern::{Leg, SearchParameters, SearchPattern};
pub use route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Forward,
    Lateral,
    /// Explicitly configured route point.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub target: GeoPoint,
    pub axis: Axis,
    pub step_index: u32,
}

/// Anything the mission controller can pull waypoints from.
///
/// `current` is where the vehicle actually is when the previous leg was judged
/// complete. Sources that plan relative legs step from it; fixed routes ignore it.
pub trait WaypointSource: Send {
    fn next_waypoint(&mut self, current: &GeoPoint) -> Option<Result<Waypoint, GeoError>>;
}
