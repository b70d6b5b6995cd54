use std::time::Duration;

/// Flight and timing parameters of one mission.
#[derive(Debug, Clone)]
pub struct MissionParams {
    pub start_altitude: f64,
    pub fly_speed: f64,
    /// Below this groundspeed a leg counts as flown.
    pub min_speed: f64,

    /// Poll interval while waiting for armable / takeoff altitude.
    pub wait_interval: Duration,
    /// Pause between connect attempts.
    pub connect_retry: Duration,
    /// Grace period after each position target before polling speed.
    pub settle: Duration,
    pub speed_poll: Duration,

    pub armable_limit: Duration,
    pub takeoff_limit: Duration,
    pub arrival_limit: Duration,
}

impl MissionParams {
    /// Altitude at which the takeoff counts as done.
    pub fn takeoff_reached(&self) -> f64 {
        0.8 * self.start_altitude
    }
}

impl Default for MissionParams {
    fn default() -> Self {
        Self {
            start_altitude: 5.0,
            fly_speed: 2.0,
            min_speed: 0.5,
            wait_interval: Duration::from_secs(1),
            connect_retry: Duration::from_secs(5),
            settle: Duration::from_secs(3),
            speed_poll: Duration::from_secs(1),
            armable_limit: Duration::from_secs(120),
            takeoff_limit: Duration::from_secs(60),
            arrival_limit: Duration::from_secs(120),
        }
    }
}
