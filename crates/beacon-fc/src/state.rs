use beacon_proto::GeoPoint;
use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavSensorOrientation, MavState};
use std::time::{Duration, Instant};

use crate::mode::FlightMode;

const HEARTBEAT_STALE: Duration = Duration::from_secs(3);
const RANGEFINDER_STALE: Duration = Duration::from_secs(1);
const GPS_FIX_3D: u8 = 3;

/// Latest autopilot state, as cached by the link's reader thread.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub last_heartbeat: Option<Instant>,
    pub mode: Option<FlightMode>,
    pub armed: bool,
    /// System status was STANDBY or ACTIVE in the last heartbeat.
    pub ready: bool,
    pub gps_fix: u8,
    pub position: Option<GeoPoint>,
    pub heading: f64,
    pub groundspeed: f64,
    pub relative_alt: Option<f64>,
    pub rangefinder: Option<(f64, Instant)>,
}

impl Telemetry {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }

    pub fn is_armable(&self) -> bool {
        let fresh = self.hb_age().map(|a| a < HEARTBEAT_STALE).unwrap_or(false);
        fresh && self.ready && self.mode.is_some() && self.gps_fix >= GPS_FIX_3D
    }

    /// Rangefinder height when a fresh in-range reading exists, else home-relative altitude.
    pub fn altitude(&self) -> f64 {
        match self.rangefinder {
            Some((alt, at)) if at.elapsed() < RANGEFINDER_STALE => alt,
            _ => self.relative_alt.unwrap_or(0.0),
        }
    }

    pub fn on_heartbeat(&mut self, custom_mode: u32, armed: bool, ready: bool) {
        self.last_heartbeat = Some(Instant::now());
        self.mode = Some(FlightMode::from_custom_mode(custom_mode));
        self.armed = armed;
        self.ready = ready;
    }

    pub fn on_global_position(&mut self, lat_e7: i32, lon_e7: i32, relative_alt_mm: i32, hdg_cdeg: u16) {
        let rel = relative_alt_mm as f64 / 1000.0;
        self.position = Some(GeoPoint::from_e7(lat_e7, lon_e7, rel));
        self.relative_alt = Some(rel);
        // u16::MAX = unknown
        if hdg_cdeg != u16::MAX {
            self.heading = hdg_cdeg as f64 / 100.0;
        }
    }

    pub fn on_vfr_hud(&mut self, groundspeed: f32, heading: i16) {
        self.groundspeed = groundspeed as f64;
        self.heading = heading.rem_euclid(360) as f64;
    }

    pub fn on_gps(&mut self, fix_type: u8) {
        self.gps_fix = fix_type;
    }

    /// Distances in cm; readings at or beyond the sensor limits are dropped.
    pub fn on_downward_range(&mut self, current_cm: u16, min_cm: u16, max_cm: u16) {
        if current_cm <= min_cm || current_cm >= max_cm {
            return;
        }
        self.rangefinder = Some((current_cm as f64 / 100.0, Instant::now()));
    }

    pub fn apply(&mut self, msg: &MavMessage) {
        match msg {
            // GCS and other companions
            MavMessage::HEARTBEAT(hb) if hb.autopilot == MavAutopilot::MAV_AUTOPILOT_INVALID => {}
            MavMessage::HEARTBEAT(hb) => {
                let armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                let ready = matches!(hb.system_status, MavState::MAV_STATE_STANDBY | MavState::MAV_STATE_ACTIVE);
                self.on_heartbeat(hb.custom_mode, armed, ready);
            }
            MavMessage::GLOBAL_POSITION_INT(p) => self.on_global_position(p.lat, p.lon, p.relative_alt, p.hdg),
            MavMessage::VFR_HUD(h) => self.on_vfr_hud(h.groundspeed, h.heading),
            MavMessage::GPS_RAW_INT(g) => self.on_gps(g.fix_type as u8),
            MavMessage::DISTANCE_SENSOR(d) if d.orientation == MavSensorOrientation::MAV_SENSOR_ROTATION_PITCH_270 => {
                self.on_downward_range(d.current_distance, d.min_distance, d.max_distance)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armable_needs_heartbeat_status_and_3d_fix() {
        let mut t = Telemetry::default();
        assert!(!t.is_armable());
        t.on_heartbeat(4, false, true);
        assert!(!t.is_armable(), "no gps yet");
        t.on_gps(2);
        assert!(!t.is_armable(), "2d fix is not enough");
        t.on_gps(3);
        assert!(t.is_armable());
        t.on_heartbeat(4, false, false);
        assert!(!t.is_armable(), "system still booting");
    }

    #[test]
    fn heartbeat_sets_mode() {
        let mut t = Telemetry::default();
        t.on_heartbeat(9, true, true);
        assert_eq!(t.mode, Some(FlightMode::Land));
        assert!(t.armed);
    }

    #[test]
    fn rangefinder_preferred_over_relative_alt() {
        let mut t = Telemetry::default();
        t.on_global_position(534_760_330, 99_298_900, 2_500, 9_000);
        assert!((t.altitude() - 2.5).abs() < 1e-9);
        assert_eq!(t.heading, 90.0);
        let p = t.position.unwrap();
        assert!((p.lat - 53.476033).abs() < 1e-7);

        t.on_downward_range(180, 20, 700);
        assert!((t.altitude() - 1.8).abs() < 1e-9);

        // out of range reading is ignored, last good one stays
        t.on_downward_range(700, 20, 700);
        assert!((t.altitude() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn vfr_hud_heading_is_wrapped() {
        let mut t = Telemetry::default();
        t.on_vfr_hud(3.5, -90);
        assert_eq!(t.heading, 270.0);
        assert_eq!(t.groundspeed, 3.5);
    }

    #[test]
    fn unknown_heading_is_kept() {
        let mut t = Telemetry::default();
        t.on_vfr_hud(0.0, 45);
        t.on_global_position(0, 0, 0, u16::MAX);
        assert_eq!(t.heading, 45.0);
    }
}
