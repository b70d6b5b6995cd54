use serde::{Deserialize, Serialize};
use std::fmt;

/// WGS-84 position. Altitude is relative to the frame the consumer uses
/// (terrain-relative for position targets, home-relative for telemetry).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    pub fn with_alt(self, alt: f64) -> Self {
        Self { alt, ..self }
    }

    /// lat/lon in 1e7 degrees, as carried by MAVLink `*_INT` messages.
    pub fn to_e7(&self) -> (i32, i32) {
        ((self.lat * 1e7).round() as i32, (self.lon * 1e7).round() as i32)
    }

    pub fn from_e7(lat_e7: i32, lon_e7: i32, alt: f64) -> Self {
        Self { lat: lat_e7 as f64 / 1e7, lon: lon_e7 as f64 / 1e7, alt }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7}, {:.1}m)", self.lat, self.lon, self.alt)
    }
}
