//! Vincenty direct/inverse solutions on the WGS-84 ellipsoid.
//!
//! Accurate to well under a millimetre for the leg lengths a search pattern
//! uses; the inverse can fail to converge for nearly antipodal points.

use beacon_proto::GeoPoint;
use thiserror::Error;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

const EPSILON: f64 = 1e-12;
const MAX_ITERATIONS: usize = 200;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    #[error("invalid geodesic input: {0}")]
    InvalidInput(String),
    #[error("vincenty inverse did not converge (near-antipodal points?)")]
    NoConvergence,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inverse {
    pub distance_m: f64,
    pub initial_bearing_deg: f64,
    pub final_bearing_deg: f64,
}

/// Point reached by travelling `distance_m` from `origin` along `bearing_deg`
/// (0 = north, clockwise). Origin altitude is carried through unchanged.
pub fn destination(origin: &GeoPoint, bearing_deg: f64, distance_m: f64) -> Result<GeoPoint, GeoError> {
    check_latitude(origin.lat)?;
    if !origin.lon.is_finite() {
        return Err(GeoError::InvalidInput(format!("longitude {} is not finite", origin.lon)));
    }
    if !bearing_deg.is_finite() {
        return Err(GeoError::InvalidInput(format!("bearing {} is not finite", bearing_deg)));
    }
    if !distance_m.is_finite() || distance_m < 0.0 {
        return Err(GeoError::InvalidInput(format!("distance {} must be finite and >= 0", distance_m)));
    }
    if distance_m == 0.0 {
        return Ok(*origin);
    }

    let alpha1 = normalize_bearing(bearing_deg).to_radians();
    let (sin_alpha1, cos_alpha1) = alpha1.sin_cos();

    let tan_u1 = (1.0 - WGS84_F) * origin.lat.to_radians().tan();
    let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
    let sin_u1 = tan_u1 * cos_u1;

    let sigma1 = tan_u1.atan2(cos_alpha1);
    let sin_alpha = cos_u1 * sin_alpha1;
    let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
    let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));

    let sigma0 = distance_m / (WGS84_B * a);
    let mut sigma = sigma0;
    for _ in 0..MAX_ITERATIONS {
        let (cos_2sigma_m, sin_sigma, cos_sigma) = sigma_terms(sigma1, sigma);
        let next = sigma0 + delta_sigma(b, sin_sigma, cos_sigma, cos_2sigma_m);
        let done = (next - sigma).abs() <= EPSILON;
        sigma = next;
        if done {
            break;
        }
    }

    let (cos_2sigma_m, sin_sigma, cos_sigma) = sigma_terms(sigma1, sigma);
    let x = sin_u1 * sin_sigma - cos_u1 * cos_sigma * cos_alpha1;
    let lat2 = (sin_u1 * cos_sigma + cos_u1 * sin_sigma * cos_alpha1)
        .atan2((1.0 - WGS84_F) * (sin_alpha * sin_alpha + x * x).sqrt());
    let lambda = (sin_sigma * sin_alpha1).atan2(cos_u1 * cos_sigma - sin_u1 * sin_sigma * cos_alpha1);
    let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
    let l = lambda
        - (1.0 - c) * WGS84_F * sin_alpha
            * (sigma + c * sin_sigma * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

    Ok(GeoPoint {
        lat: lat2.to_degrees(),
        lon: normalize_longitude(origin.lon + l.to_degrees()),
        alt: origin.alt,
    })
}

/// Distance and bearings between two points (altitude ignored).
pub fn inverse(from: &GeoPoint, to: &GeoPoint) -> Result<Inverse, GeoError> {
    check_latitude(from.lat)?;
    check_latitude(to.lat)?;

    let l = (to.lon - from.lon).to_radians();
    let tan_u1 = (1.0 - WGS84_F) * from.lat.to_radians().tan();
    let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
    let sin_u1 = tan_u1 * cos_u1;
    let tan_u2 = (1.0 - WGS84_F) * to.lat.to_radians().tan();
    let cos_u2 = 1.0 / (1.0 + tan_u2 * tan_u2).sqrt();
    let sin_u2 = tan_u2 * cos_u2;

    let mut lambda = l;
    let mut converged = false;
    let (mut sin_lambda, mut cos_lambda) = (0.0, 0.0);
    let (mut sin_sigma, mut cos_sigma, mut sigma) = (0.0, 0.0, 0.0);
    let (mut cos_sq_alpha, mut cos_2sigma_m) = (0.0, 0.0);

    for _ in 0..MAX_ITERATIONS {
        (sin_lambda, cos_lambda) = lambda.sin_cos();
        let t1 = cos_u2 * sin_lambda;
        let t2 = cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda;
        let sin_sq_sigma = t1 * t1 + t2 * t2;
        if sin_sq_sigma == 0.0 {
            return Ok(Inverse { distance_m: 0.0, initial_bearing_deg: 0.0, final_bearing_deg: 0.0 });
        }
        sin_sigma = sin_sq_sigma.sqrt();
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha = 0
        cos_2sigma_m = if cos_sq_alpha != 0.0 { cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha } else { 0.0 };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let prev = lambda;
        lambda = l
            + (1.0 - c) * WGS84_F * sin_alpha
                * (sigma + c * sin_sigma * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
        if (lambda - prev).abs() <= EPSILON {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(GeoError::NoConvergence);
    }

    let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    let distance_m = WGS84_B * a * (sigma - delta_sigma(b, sin_sigma, cos_sigma, cos_2sigma_m));

    let alpha1 = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
    let alpha2 = (cos_u1 * sin_lambda).atan2(-sin_u1 * cos_u2 + cos_u1 * sin_u2 * cos_lambda);

    Ok(Inverse {
        distance_m,
        initial_bearing_deg: normalize_bearing(alpha1.to_degrees()),
        final_bearing_deg: normalize_bearing(alpha2.to_degrees()),
    })
}

/// Bearing folded into [0, 360).
pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    if b >= 360.0 { 0.0 } else { b }
}

fn normalize_longitude(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

fn check_latitude(lat: f64) -> Result<(), GeoError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(GeoError::InvalidInput(format!("latitude {} outside [-90, 90]", lat)));
    }
    Ok(())
}

fn sigma_terms(sigma1: f64, sigma: f64) -> (f64, f64, f64) {
    let cos_2sigma_m = (2.0 * sigma1 + sigma).cos();
    let (sin_sigma, cos_sigma) = sigma.sin_cos();
    (cos_2sigma_m, sin_sigma, cos_sigma)
}

fn delta_sigma(b: f64, sin_sigma: f64, cos_sigma: f64, cos_2sigma_m: f64) -> f64 {
    let c2 = cos_2sigma_m * cos_2sigma_m;
    b * sin_sigma
        * (cos_2sigma_m
            + b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * c2)
                    - b / 6.0 * cos_2sigma_m * (-3.0 + 4.0 * sin_sigma * sin_sigma) * (-3.0 + 4.0 * c2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hamburg() -> GeoPoint {
        GeoPoint::new(53.476033, 9.929890, 5.0)
    }

    #[test]
    fn zero_distance_returns_origin() {
        let o = hamburg();
        assert_eq!(destination(&o, 123.0, 0.0).unwrap(), o);
    }

    #[test]
    fn north_step_moves_only_latitude() {
        let o = hamburg();
        let d = destination(&o, 0.0, 10.0).unwrap();
        assert!((d.lon - o.lon).abs() < 1e-12);
        // meridional degree is ~111.3 km at this latitude
        let dlat_m = (d.lat - o.lat) * 111_296.0;
        assert!((dlat_m - 10.0).abs() < 0.05, "dlat_m={}", dlat_m);
        assert_eq!(d.alt, o.alt);
    }

    #[test]
    fn east_step_moves_mostly_longitude() {
        let o = hamburg();
        let d = destination(&o, 90.0, 100.0).unwrap();
        assert!(d.lon > o.lon);
        assert!((d.lat - o.lat).abs() < 1e-6);
    }

    #[test]
    fn negative_bearing_equals_wrapped_bearing() {
        let o = hamburg();
        let a = destination(&o, -90.0, 42.0).unwrap();
        let b = destination(&o, 270.0, 42.0).unwrap();
        assert!((a.lat - b.lat).abs() < 1e-12);
        assert!((a.lon - b.lon).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_input() {
        let o = hamburg();
        assert!(matches!(destination(&o, 0.0, -1.0), Err(GeoError::InvalidInput(_))));
        assert!(matches!(destination(&o, 0.0, f64::NAN), Err(GeoError::InvalidInput(_))));
        assert!(matches!(destination(&o, f64::INFINITY, 1.0), Err(GeoError::InvalidInput(_))));
        let bad = GeoPoint::new(91.0, 0.0, 0.0);
        assert!(matches!(destination(&bad, 0.0, 1.0), Err(GeoError::InvalidInput(_))));
    }

    #[test]
    fn longitude_wraps_across_antimeridian() {
        let o = GeoPoint::new(0.0, 179.9999, 0.0);
        let d = destination(&o, 90.0, 1_000.0).unwrap();
        assert!(d.lon < -179.0, "lon={}", d.lon);
    }

    #[test]
    fn inverse_of_known_pair() {
        // Flinders Peak -> Buninyong, the classic Vincenty test case.
        let a = GeoPoint::new(-37.951_033_416_7, 144.424_867_888_9, 0.0);
        let b = GeoPoint::new(-37.652_821_138_9, 143.926_495_527_8, 0.0);
        let inv = inverse(&a, &b).unwrap();
        assert!((inv.distance_m - 54_972.271).abs() < 0.01, "d={}", inv.distance_m);
        assert!((inv.initial_bearing_deg - 306.868_159).abs() < 1e-4);
    }

    #[test]
    fn inverse_of_coincident_points_is_zero() {
        let o = hamburg();
        let inv = inverse(&o, &o).unwrap();
        assert_eq!(inv.distance_m, 0.0);
    }
}
