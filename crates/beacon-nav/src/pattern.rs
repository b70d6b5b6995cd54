//! Expanding zig-zag search pattern.
//!
//! Each meander is a forward leg of `meander_distance` along the search heading
//! followed by a lateral leg perpendicular to it. Lateral legs alternate sides
//! and grow so the swept area stays inside a fan of `search_angle` centred on
//! the heading: the k-th lateral leg is `(2k - 1) * d * tan(angle / 2)`.

use beacon_proto::GeoPoint;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geodesy::{destination, normalize_bearing, GeoError};
use crate::{Axis, Waypoint, WaypointSource};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParameters {
    pub meander_distance: f64,
    /// Full fan angle in degrees, 0 < angle < 180.
    pub search_angle: f64,
    pub meander_count: u32,
    pub fly_altitude: f64,
    pub fly_speed: f64,
}

impl SearchParameters {
    /// Length of the lateral leg closing meander `step` (1-based).
    pub fn lateral_distance(&self, step: u32) -> f64 {
        let tan_half = (self.search_angle / 2.0).to_radians().tan();
        (2.0 * step as f64 - 1.0) * self.meander_distance * tan_half
    }
}

/// One relative movement of the pattern, not yet anchored to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub axis: Axis,
    pub step_index: u32,
    pub bearing_deg: f64,
    pub distance_m: f64,
}

impl Leg {
    pub fn resolve(&self, from: &GeoPoint, altitude: f64) -> Result<Waypoint, GeoError> {
        let target = destination(from, self.bearing_deg, self.distance_m)?.with_alt(altitude);
        Ok(Waypoint { target, axis: self.axis, step_index: self.step_index })
    }
}

#[derive(Debug, Clone)]
pub struct SearchPattern {
    params: SearchParameters,
    bearing_deg: f64,
    step: u32,
    lateral_next: bool,
    sign: f64,
}

impl SearchPattern {
    pub fn new(bearing_deg: f64, params: SearchParameters) -> Self {
        Self { params, bearing_deg, step: 1, lateral_next: false, sign: 1.0 }
    }

    /// Dead-reckoned waypoints assuming every leg ends exactly on target.
    /// Consumes the pattern; used for previews, not for flying.
    pub fn preview(self, start: GeoPoint) -> Result<Vec<Waypoint>, GeoError> {
        let alt = self.params.fly_altitude;
        let mut at = start;
        let mut out = Vec::new();
        for leg in self {
            let wp = leg.resolve(&at, alt)?;
            at = wp.target;
            out.push(wp);
        }
        Ok(out)
    }

    fn remaining(&self) -> usize {
        if self.step > self.params.meander_count {
            return 0;
        }
        let steps_left = (self.params.meander_count - self.step + 1) as usize;
        steps_left * 2 - usize::from(self.lateral_next)
    }
}

impl Iterator for SearchPattern {
    type Item = Leg;

    fn next(&mut self) -> Option<Leg> {
        if self.step > self.params.meander_count {
            return None;
        }
        if !self.lateral_next {
            self.lateral_next = true;
            return Some(Leg {
                axis: Axis::Forward,
                step_index: self.step,
                bearing_deg: normalize_bearing(self.bearing_deg),
                distance_m: self.params.meander_distance,
            });
        }

        let leg = Leg {
            axis: Axis::Lateral,
            step_index: self.step,
            bearing_deg: normalize_bearing(self.bearing_deg + 90.0 * self.sign),
            distance_m: self.params.lateral_distance(self.step),
        };
        self.sign = -self.sign;
        self.lateral_next = false;
        self.step += 1;
        Some(leg)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for SearchPattern {}
impl std::iter::FusedIterator for SearchPattern {}

impl WaypointSource for SearchPattern {
    fn next_waypoint(&mut self, current: &GeoPoint) -> Option<Result<Waypoint, GeoError>> {
        let leg = self.next()?;
        trace!(?leg, from = %current, "pattern: next leg");
        Some(leg.resolve(current, self.params.fly_altitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::inverse;

    fn params(count: u32) -> SearchParameters {
        SearchParameters {
            meander_distance: 10.0,
            search_angle: 60.0,
            meander_count: count,
            fly_altitude: 3.0,
            fly_speed: 2.0,
        }
    }

    #[test]
    fn yields_two_legs_per_meander_alternating_axes() {
        let legs: Vec<Leg> = SearchPattern::new(0.0, params(5)).collect();
        assert_eq!(legs.len(), 10);
        for (i, leg) in legs.iter().enumerate() {
            let expected = if i % 2 == 0 { Axis::Forward } else { Axis::Lateral };
            assert_eq!(leg.axis, expected, "leg {}", i);
            assert_eq!(leg.step_index, (i / 2 + 1) as u32);
        }
    }

    #[test]
    fn lateral_legs_strictly_grow() {
        let laterals: Vec<f64> = SearchPattern::new(17.0, params(6))
            .filter(|l| l.axis == Axis::Lateral)
            .map(|l| l.distance_m)
            .collect();
        assert_eq!(laterals.len(), 6);
        assert!(laterals.windows(2).all(|w| w[1] > w[0]), "{:?}", laterals);
    }

    #[test]
    fn zero_meanders_is_empty() {
        let mut p = SearchPattern::new(0.0, params(0));
        assert_eq!(p.len(), 0);
        assert!(p.next().is_none());
        assert!(p.next_waypoint(&GeoPoint::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn size_hint_tracks_progress() {
        let mut p = SearchPattern::new(0.0, params(2));
        assert_eq!(p.len(), 4);
        p.next();
        assert_eq!(p.len(), 3);
        p.next();
        assert_eq!(p.len(), 2);
        p.by_ref().for_each(drop);
        assert_eq!(p.len(), 0);
        assert!(p.next().is_none());
    }

    #[test]
    fn two_meanders_heading_north() {
        let legs: Vec<Leg> = SearchPattern::new(0.0, params(2)).collect();
        assert_eq!(legs.len(), 4);

        assert_eq!(legs[0].axis, Axis::Forward);
        assert_eq!(legs[0].bearing_deg, 0.0);
        assert_eq!(legs[0].distance_m, 10.0);

        assert_eq!(legs[1].axis, Axis::Lateral);
        assert_eq!(legs[1].bearing_deg, 90.0);
        assert!((legs[1].distance_m - 5.7735).abs() < 1e-3, "{}", legs[1].distance_m);

        assert_eq!(legs[2].axis, Axis::Forward);
        assert_eq!(legs[2].bearing_deg, 0.0);
        assert_eq!(legs[2].distance_m, 10.0);

        assert_eq!(legs[3].axis, Axis::Lateral);
        assert_eq!(legs[3].bearing_deg, 270.0);
        assert!((legs[3].distance_m - 17.3205).abs() < 1e-3, "{}", legs[3].distance_m);
    }

    #[test]
    fn preview_chains_legs_at_fly_altitude() {
        let start = GeoPoint::new(53.476033, 9.929890, 0.0);
        let wps = SearchPattern::new(0.0, params(2)).preview(start).unwrap();
        assert_eq!(wps.len(), 4);
        assert!(wps.iter().all(|w| w.target.alt == 3.0));

        let first = inverse(&start, &wps[0].target).unwrap();
        assert!((first.distance_m - 10.0).abs() < 1e-6);
        let off_north = (first.initial_bearing_deg + 180.0).rem_euclid(360.0) - 180.0;
        assert!(off_north.abs() < 1e-6, "{}", first.initial_bearing_deg);

        let lateral = inverse(&wps[0].target, &wps[1].target).unwrap();
        assert!((lateral.distance_m - 5.7735).abs() < 1e-3);
        assert!((lateral.initial_bearing_deg - 90.0).abs() < 1e-3);

        let second_forward = inverse(&wps[1].target, &wps[2].target).unwrap();
        assert!((second_forward.distance_m - 10.0).abs() < 1e-6);
    }

    #[test]
    fn next_waypoint_steps_from_supplied_position() {
        let mut p = SearchPattern::new(45.0, params(1));
        let drifted = GeoPoint::new(10.0, 20.0, 7.0);
        let wp = p.next_waypoint(&drifted).unwrap().unwrap();
        let inv = inverse(&drifted, &wp.target).unwrap();
        assert!((inv.distance_m - 10.0).abs() < 1e-6);
        assert!((inv.initial_bearing_deg - 45.0).abs() < 1e-6);
        assert_eq!(wp.target.alt, 3.0);
    }
}
