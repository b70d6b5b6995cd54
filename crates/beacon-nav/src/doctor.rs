use anyhow::Result;

use crate::pattern::SearchParameters;
use crate::route::Route;

pub fn check_search_parameters(p: &SearchParameters) -> Result<()> {
    anyhow::ensure!(p.meander_distance.is_finite() && p.meander_distance > 0.0, "MEANDER_DISTANCE must be > 0");
    anyhow::ensure!(p.search_angle > 0.0 && p.search_angle < 180.0, "SEARCH_ANGLE must be in (0, 180)");
    anyhow::ensure!(p.meander_count >= 1, "MEANDER_COUNT must be >= 1");
    anyhow::ensure!(p.fly_altitude.is_finite() && p.fly_altitude > 0.0, "FLY_ALTITUDE must be > 0");
    anyhow::ensure!(p.fly_speed.is_finite() && p.fly_speed > 0.0, "FLY_SPEED must be > 0");
    Ok(())
}

pub fn check_route(route: &Route) -> Result<()> {
    anyhow::ensure!(!route.waypoints.is_empty(), "route.waypoints must have >= 1 point");
    for (i, p) in route.waypoints.iter().enumerate() {
        anyhow::ensure!(p.lat.abs() <= 90.0 && p.lon.abs() <= 180.0, "route point {} coordinates invalid", i);
        anyhow::ensure!(p.alt > 0.0, "route point {} altitude must be > 0", i);
    }
    Ok(())
}
