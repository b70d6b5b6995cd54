use beacon_proto::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::geodesy::GeoError;
use crate::{Axis, Waypoint, WaypointSource};

/// Fixed list of points flown in order (bench flights: go to start, go to finish, land).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub waypoints: Vec<GeoPoint>,
}

impl Route {
    pub fn new(waypoints: Vec<GeoPoint>) -> Self {
        Self { waypoints }
    }

    pub fn into_source(self) -> RouteSource {
        RouteSource { pending: self.waypoints.into(), next_index: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct RouteSource {
    pending: VecDeque<GeoPoint>,
    next_index: u32,
}

impl WaypointSource for RouteSource {
    fn next_waypoint(&mut self, _current: &GeoPoint) -> Option<Result<Waypoint, GeoError>> {
        let target = self.pending.pop_front()?;
        let step_index = self.next_index;
        self.next_index += 1;
        if !(-90.0..=90.0).contains(&target.lat) || !(-180.0..=180.0).contains(&target.lon) {
            return Some(Err(GeoError::InvalidInput(format!("route point {} out of range", target))));
        }
        Some(Ok(Waypoint { target, axis: Axis::Direct, step_index }))
    }
}
