//! Geodetic <-> Earth-centered Earth-fixed conversions on the WGS84 ellipsoid.
//!
//! ECEF to geodetic starts from Bowring's closed-form latitude and polishes it
//! with a few fixed-point iterations. Accuracy degrades close to the poles,
//! where the longitude is undefined and the latitude update becomes stiff.

use nalgebra as na;

use crate::types::Geodetic;

/// WGS84 semi-major axis in meters.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = 6.694_379_990_14e-3;

const MAX_REFINE_ITERS: usize = 5;
const LATITUDE_EPS: f64 = 1e-14;

fn prime_vertical_radius(sin_lat: f64) -> f64 {
    WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt()
}

pub fn geodetic_to_ecef(geo: &Geodetic) -> na::Point3<f64> {
    let lat = geo.latitude.to_radians();
    let lon = geo.longitude.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = prime_vertical_radius(sin_lat);
    na::Point3::new(
        (n + geo.altitude) * cos_lat * lon.cos(),
        (n + geo.altitude) * cos_lat * lon.sin(),
        (n * (1.0 - WGS84_E2) + geo.altitude) * sin_lat,
    )
}

pub fn ecef_to_geodetic(ecef: &na::Point3<f64>) -> Geodetic {
    let (x, y, z) = (ecef.x, ecef.y, ecef.z);
    let b = WGS84_A * (1.0 - WGS84_E2).sqrt();
    let ep2 = (WGS84_A * WGS84_A - b * b) / (b * b);
    let p = x.hypot(y);
    let lon = y.atan2(x);

    let theta = (WGS84_A * z).atan2(b * p);
    let (sin_t, cos_t) = theta.sin_cos();
    let mut lat = (z + ep2 * b * sin_t.powi(3)).atan2(p - WGS84_E2 * WGS84_A * cos_t.powi(3));

    for _ in 0..MAX_REFINE_ITERS {
        let n = prime_vertical_radius(lat.sin());
        let h = p * lat.cos() + z * lat.sin() - WGS84_A * WGS84_A / n;
        let next = z.atan2(p * (1.0 - WGS84_E2 * n / (n + h)));
        let delta = (next - lat).abs();
        lat = next;
        if delta < LATITUDE_EPS {
            break;
        }
    }

    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = prime_vertical_radius(sin_lat);
    let alt = p * cos_lat + z * sin_lat - WGS84_A * WGS84_A / n;

    Geodetic::new(lat.to_degrees(), lon.to_degrees(), alt)
}

/// Degrees/minutes/seconds plus a hemisphere letter to signed decimal degrees.
///
/// `S` and `W` (either case) negate; any other letter is treated as positive.
pub fn dms_to_degrees(degrees: f64, minutes: f64, seconds: f64, hemisphere: char) -> f64 {
    let sign = match hemisphere.to_ascii_uppercase() {
        'S' | 'W' => -1.0,
        _ => 1.0,
    };
    sign * (degrees + minutes / 60.0 + seconds / 3600.0)
}
