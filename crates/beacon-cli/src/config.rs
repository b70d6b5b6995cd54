use beacon_fc::FcConfig;
use beacon_mission::{MissionParams, Plan};
use beacon_nav::{Route, SearchParameters};
use beacon_sense::BeaconConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Upper bound for every duration key; deadlines are computed as `Instant + d`.
const MAX_SECONDS: f64 = 86_400.0;

/// Mission parameter file. Top-level keys keep the names field crews already
/// use in their parameter sheets; durations are seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Parameters {
    pub wait_timeout: f64,
    pub con_timeout: f64,
    pub fly_speed: f64,
    pub start_altitude: f64,
    pub meander_count: u32,
    pub meander_distance: f64,
    pub search_angle: f64,
    pub fly_altitude: f64,

    #[serde(default = "default_meander_min_timeout")]
    pub meander_min_timeout: f64,
    #[serde(default = "default_meander_min_speed")]
    pub meander_min_speed: f64,
    #[serde(default = "default_meander_min_speed_timeout")]
    pub meander_min_speed_timeout: f64,
    #[serde(default = "default_armable_limit")]
    pub armable_limit: f64,
    #[serde(default = "default_takeoff_limit")]
    pub takeoff_limit: f64,
    #[serde(default = "default_arrival_limit")]
    pub arrival_limit: f64,

    #[serde(rename = "beacon", default)]
    pub beacon: BeaconConfig,
    #[serde(rename = "route", default)]
    pub route: Option<Route>,
    #[serde(rename = "fc", default)]
    pub fc: FcConfig,
}

fn default_meander_min_timeout() -> f64 {
    3.0
}
fn default_meander_min_speed() -> f64 {
    0.5
}
fn default_meander_min_speed_timeout() -> f64 {
    1.0
}
fn default_armable_limit() -> f64 {
    120.0
}
fn default_takeoff_limit() -> f64 {
    60.0
}
fn default_arrival_limit() -> f64 {
    120.0
}

impl Parameters {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&s).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path: path.to_path_buf(), source },
            other => other,
        })
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let p: Self = toml::from_str(s).map_err(|source| ConfigError::Parse { path: PathBuf::new(), source })?;
        p.validate()?;
        Ok(p)
    }

    /// Checks that keep the `Duration` conversions below from panicking. Search geometry
    /// is checked separately, only when a pattern is what will be flown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let seconds = [
            ("WAIT_TIMEOUT", self.wait_timeout),
            ("CON_TIMEOUT", self.con_timeout),
            ("MEANDER_MIN_TIMEOUT", self.meander_min_timeout),
            ("MEANDER_MIN_SPEED_TIMEOUT", self.meander_min_speed_timeout),
            ("ARMABLE_LIMIT", self.armable_limit),
            ("TAKEOFF_LIMIT", self.takeoff_limit),
            ("ARRIVAL_LIMIT", self.arrival_limit),
        ];
        for (key, v) in seconds {
            if Duration::try_from_secs_f64(v).is_err() || v > MAX_SECONDS {
                return Err(ConfigError::Invalid(format!("{} must be 0..={} seconds, got {}", key, MAX_SECONDS, v)));
            }
        }
        for (key, v) in [("FLY_SPEED", self.fly_speed), ("START_ALTITUDE", self.start_altitude)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0, got {}", key, v)));
            }
        }
        if !self.meander_min_speed.is_finite() || self.meander_min_speed < 0.0 {
            return Err(ConfigError::Invalid(format!("MEANDER_MIN_SPEED must be >= 0, got {}", self.meander_min_speed)));
        }
        self.beacon.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn search_parameters(&self) -> SearchParameters {
        SearchParameters {
            meander_distance: self.meander_distance,
            search_angle: self.search_angle,
            meander_count: self.meander_count,
            fly_altitude: self.fly_altitude,
            fly_speed: self.fly_speed,
        }
    }

    /// An explicit route wins over the generated pattern.
    pub fn plan(&self) -> Plan {
        match &self.route {
            Some(r) if !r.waypoints.is_empty() => Plan::Route(r.clone()),
            _ => Plan::Pattern(self.search_parameters()),
        }
    }

    pub fn mission_params(&self) -> MissionParams {
        MissionParams {
            start_altitude: self.start_altitude,
            fly_speed: self.fly_speed,
            min_speed: self.meander_min_speed,
            wait_interval: Duration::from_secs_f64(self.wait_timeout),
            connect_retry: Duration::from_secs_f64(self.con_timeout),
            settle: Duration::from_secs_f64(self.meander_min_timeout),
            speed_poll: Duration::from_secs_f64(self.meander_min_speed_timeout),
            armable_limit: Duration::from_secs_f64(self.armable_limit),
            takeoff_limit: Duration::from_secs_f64(self.takeoff_limit),
            arrival_limit: Duration::from_secs_f64(self.arrival_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
WAIT_TIMEOUT = 1
CON_TIMEOUT = 5
FLY_SPEED = 2.5
START_ALTITUDE = 5
MEANDER_COUNT = 3
MEANDER_DISTANCE = 10
SEARCH_ANGLE = 60
FLY_ALTITUDE = 3
"#;

    #[test]
    fn minimal_file_gets_defaults() {
        let p = Parameters::parse(MINIMAL).unwrap();
        assert_eq!(p.meander_count, 3);
        assert_eq!(p.meander_min_timeout, 3.0);
        assert_eq!(p.meander_min_speed, 0.5);
        assert_eq!(p.beacon.pin, 17);
        assert_eq!(p.fc.comp_id, 191);
        assert!(matches!(p.plan(), Plan::Pattern(sp) if sp.meander_distance == 10.0));

        let m = p.mission_params();
        assert_eq!(m.connect_retry, Duration::from_secs(5));
        assert_eq!(m.settle, Duration::from_secs(3));
        assert_eq!(m.arrival_limit, Duration::from_secs(120));
        assert_eq!(m.fly_speed, 2.5);
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let s = MINIMAL.replace("SEARCH_ANGLE = 60\n", "");
        let err = Parameters::parse(&s).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("SEARCH_ANGLE"), "{}", err);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let s = MINIMAL.replace("MEANDER_COUNT = 3", "MEANDER_COUNT = \"three\"");
        assert!(matches!(Parameters::parse(&s), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let s = MINIMAL.replace("CON_TIMEOUT = 5", "CON_TIMEOUT = -1");
        assert!(matches!(Parameters::parse(&s), Err(ConfigError::Invalid(m)) if m.contains("CON_TIMEOUT")));
    }

    #[test]
    fn huge_timeout_is_rejected() {
        let s = MINIMAL.replace("WAIT_TIMEOUT = 1", "WAIT_TIMEOUT = 1e20");
        assert!(matches!(Parameters::parse(&s), Err(ConfigError::Invalid(m)) if m.contains("WAIT_TIMEOUT")));
        let s = MINIMAL.replace("CON_TIMEOUT = 5", "CON_TIMEOUT = inf");
        assert!(matches!(Parameters::parse(&s), Err(ConfigError::Invalid(m)) if m.contains("CON_TIMEOUT")));
    }

    #[test]
    fn bad_beacon_table_is_rejected() {
        let s = format!("{}\n[beacon]\nsample_count = 39\nthreshold = 40\n", MINIMAL);
        assert!(matches!(Parameters::parse(&s), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn beacon_and_fc_tables_override_defaults() {
        let s = format!(
            "{}\n[beacon]\npin = 27\npull = \"up\"\nactive_low = true\nsample_count = 39\nthreshold = 35\n\n[fc]\nheartbeat_timeout_ms = 1500\n",
            MINIMAL
        );
        let p = Parameters::parse(&s).unwrap();
        assert_eq!(p.beacon.pin, 27);
        assert!(p.beacon.active_low);
        assert_eq!(p.beacon.threshold, 35);
        assert_eq!(p.fc.heartbeat_timeout_ms, 1500);
    }

    #[test]
    fn route_table_selects_route_plan() {
        let s = format!(
            "{}\n[route]\nwaypoints = [\n  {{ lat = 53.4761, lon = 9.9300, alt = 4.0 }},\n  {{ lat = 53.4765, lon = 9.9305, alt = 6.0 }},\n]\n",
            MINIMAL
        );
        let p = Parameters::parse(&s).unwrap();
        match p.plan() {
            Plan::Route(r) => {
                assert_eq!(r.waypoints.len(), 2);
                assert_eq!(r.waypoints[1].alt, 6.0);
            }
            other => panic!("expected route, got {:?}", other),
        }
    }

    #[test]
    fn load_reports_path() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(MINIMAL.as_bytes()).unwrap();
        let p = Parameters::load(f.path()).unwrap();
        assert_eq!(p.fly_altitude, 3.0);

        let missing = f.path().with_extension("nope");
        let err = Parameters::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("nope"));
    }
}
