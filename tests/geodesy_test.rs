use detection_waypoints::geodesy::{
    WGS84_A, WGS84_E2, dms_to_degrees, ecef_to_geodetic, geodetic_to_ecef,
};
use detection_waypoints::types::Geodetic;

#[test]
fn test_reference_points() {
    let equator = geodetic_to_ecef(&Geodetic::new(0.0, 0.0, 0.0));
    assert!((equator.x - WGS84_A).abs() < 1e-6);
    assert!(equator.y.abs() < 1e-6 && equator.z.abs() < 1e-6);

    let b = WGS84_A * (1.0 - WGS84_E2).sqrt();
    let pole = geodetic_to_ecef(&Geodetic::new(90.0, 0.0, 100.0));
    assert!((pole.z - (b + 100.0)).abs() < 1e-6);

    let east = geodetic_to_ecef(&Geodetic::new(0.0, 90.0, 0.0));
    assert!((east.y - WGS84_A).abs() < 1e-6);
}

#[test]
fn test_round_trip() {
    for lat in (-85..=85).step_by(17) {
        for lon in (-175..=180).step_by(35) {
            for alt in [-500.0, 0.0, 123.4, 1000.0, 10000.0] {
                let geo = Geodetic::new(lat as f64 + 0.123, lon as f64 - 0.456, alt);
                let back = ecef_to_geodetic(&geodetic_to_ecef(&geo));
                assert!(
                    (back.latitude - geo.latitude).abs() < 1e-7,
                    "lat {geo:?} -> {back:?}"
                );
                assert!(
                    (back.longitude - geo.longitude).abs() < 1e-7,
                    "lon {geo:?} -> {back:?}"
                );
                assert!(
                    (back.altitude - geo.altitude).abs() < 1e-3,
                    "alt {geo:?} -> {back:?}"
                );
            }
        }
    }
}

#[test]
fn test_dms() {
    assert!((dms_to_degrees(48.0, 8.0, 30.0, 'N') - 48.141_666_666_666_67).abs() < 1e-12);
    assert!((dms_to_degrees(11.0, 34.0, 48.0, 'E') - 11.58).abs() < 1e-12);
    assert!((dms_to_degrees(33.0, 30.0, 0.0, 'S') + 33.5).abs() < 1e-12);
    assert!((dms_to_degrees(70.0, 15.0, 0.0, 'w') + 70.25).abs() < 1e-12);
}
