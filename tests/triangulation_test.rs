use detection_waypoints::config::TriangulationConfig;
use detection_waypoints::optimization::{
    RobustRayOptions, fit_point_to_rays, rms_ray_distance, triangulate, triangulate_candidates,
    triangulate_robust,
};
use detection_waypoints::types::CameraRay;
use detection_waypoints::{Error, ErrorKind};
use nalgebra as na;

fn ring_origins(n: usize) -> Vec<na::Point3<f64>> {
    (0..n)
        .map(|i| {
            let a = i as f64 / n as f64 * std::f64::consts::TAU;
            na::Point3::new(10.0 * a.cos(), 10.0 * a.sin(), 20.0)
        })
        .collect()
}

fn rays_through(target: &na::Point3<f64>, origins: &[na::Point3<f64>]) -> Vec<CameraRay> {
    origins
        .iter()
        .map(|o| CameraRay::new(*o, target - o))
        .collect()
}

#[test]
fn test_exact_rays_recover_point() {
    let target = na::Point3::new(1.0, 2.0, 3.0);
    let origins = [
        na::Point3::new(0.0, 0.0, 0.0),
        na::Point3::new(10.0, 0.0, 0.0),
        na::Point3::new(0.0, 10.0, 0.0),
        na::Point3::new(5.0, 5.0, 20.0),
    ];
    // directions deliberately left unnormalized
    let raw: Vec<CameraRay> = origins
        .iter()
        .enumerate()
        .map(|(i, o)| CameraRay {
            origin: *o,
            direction: na::Unit::new_unchecked((target - o) * (i as f64 + 2.0)),
        })
        .collect();
    let p = fit_point_to_rays(&raw).unwrap();
    assert!((p - target).norm() < 1e-9, "got {p}");

    let rays = rays_through(&target, &origins);
    assert!(rms_ray_distance(&rays, &p) < 1e-9);
}

#[test]
fn test_two_rays_are_enough() {
    let target = na::Point3::new(-3.0, 4.0, 0.5);
    let rays = rays_through(&target, &ring_origins(2));
    let p = fit_point_to_rays(&rays).unwrap();
    assert!((p - target).norm() < 1e-9);
}

#[test]
fn test_parallel_rays_are_insufficient() {
    let dir = na::Vector3::new(0.0, 0.0, -1.0);
    let rays: Vec<CameraRay> = (0..3)
        .map(|i| CameraRay::new(na::Point3::new(i as f64, 0.0, 10.0), dir))
        .collect();
    let err = fit_point_to_rays(&rays).unwrap_err();
    assert!(matches!(err, Error::InsufficientGeometry(_)));
    assert_eq!(err.kind(), ErrorKind::Geometry);

    let single = [CameraRay::new(na::Point3::origin(), dir)];
    assert!(fit_point_to_rays(&single).is_err());
    assert!(fit_point_to_rays(&[]).is_err());
}

fn rays_with_outliers() -> (na::Point3<f64>, Vec<CameraRay>) {
    let target = na::Point3::new(1.0, 2.0, 0.0);
    let origins = ring_origins(10);
    let mut rays = rays_through(&target, &origins[..8]);
    let decoy = na::Point3::new(30.0, 30.0, 0.0);
    rays.extend(rays_through(&decoy, &origins[8..]));
    (target, rays)
}

#[test]
fn test_robust_rejects_outlier_rays() {
    let (target, rays) = rays_with_outliers();
    let opts = RobustRayOptions {
        num_samples: 500,
        rays_per_sample: 5,
        threshold: 0.1,
        seed: 42,
    };
    let result = triangulate_robust(&rays, &opts).unwrap();
    assert_eq!(result.support, 8);
    assert!((result.point - target).norm() < 1e-6);

    // plain least squares is dragged away by the two bad rays
    let plain = fit_point_to_rays(&rays).unwrap();
    assert!((plain - target).norm() > 0.1);
}

#[test]
fn test_robust_candidates_are_reproducible() {
    let (_, rays) = rays_with_outliers();
    let opts = RobustRayOptions {
        num_samples: 200,
        rays_per_sample: 4,
        threshold: 0.1,
        seed: 9,
    };
    let a = triangulate_candidates(&rays, &opts).unwrap();
    let b = triangulate_candidates(&rays, &opts).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.sample, y.sample);
        assert_eq!(x.point, y.point);
    }
    for candidate in &a {
        let mut origins: Vec<usize> = candidate.sample.clone();
        origins.sort_unstable();
        origins.dedup();
        assert_eq!(origins.len(), 4, "sample reuses a ray");
    }
}

#[test]
fn test_robust_needs_two_origins() {
    let origin = na::Point3::new(0.0, 0.0, 10.0);
    let rays = vec![
        CameraRay::new(origin, na::Vector3::new(0.0, 0.1, -1.0)),
        CameraRay::new(origin, na::Vector3::new(0.1, 0.0, -1.0)),
    ];
    let opts = RobustRayOptions {
        num_samples: 10,
        rays_per_sample: 5,
        threshold: 0.1,
        seed: 0,
    };
    assert!(matches!(
        triangulate_candidates(&rays, &opts),
        Err(Error::InsufficientGeometry(_))
    ));
}

#[test]
fn test_triangulate_dispatches_on_config() {
    let (target, rays) = rays_with_outliers();
    let plain = triangulate(&rays, &TriangulationConfig::default(), 0).unwrap();
    assert_eq!(plain.support, rays.len());

    let config = TriangulationConfig {
        robust: true,
        num_samples: 300,
        ..Default::default()
    };
    let robust = triangulate(&rays, &config, 0).unwrap();
    assert!((robust.point - target).norm() < 1e-6);
    assert!(robust.rms_distance < 1e-6);
}
