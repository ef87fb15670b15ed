use std::collections::BTreeMap;

use log::debug;
use nalgebra as na;
use rand::SeedableRng;
use rand::seq::IndexedRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::TriangulationConfig;
use crate::error::{Error, Result};
use crate::types::CameraRay;

/// Smallest eigenvalue of the normal matrix, per ray, below which the rays
/// are treated as parallel.
const SINGULAR_EPS: f64 = 1e-12;

/// Triangulated point together with how well the rays agree on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RayPoint {
    pub point: na::Point3<f64>,
    pub rms_distance: f64,
    /// Number of rays the point was fitted to.
    pub support: usize,
}

/// Point fitted to one random minimal sample of rays.
#[derive(Debug, Clone)]
pub struct RayCandidate {
    pub point: na::Point3<f64>,
    pub sample: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct RobustRayOptions {
    pub num_samples: usize,
    pub rays_per_sample: usize,
    pub threshold: f64,
    pub seed: u64,
}

impl RobustRayOptions {
    pub fn from_config(config: &TriangulationConfig, seed: u64) -> RobustRayOptions {
        RobustRayOptions {
            num_samples: config.num_samples,
            rays_per_sample: config.rays_per_sample,
            threshold: config.threshold,
            seed,
        }
    }
}

/// Closed-form point minimizing the summed squared perpendicular distance
/// to every ray: `sum(I - d d^T) x = sum(I - d d^T) C`.
pub fn fit_point_to_rays(rays: &[CameraRay]) -> Result<na::Point3<f64>> {
    if rays.is_empty() {
        return Err(Error::InsufficientGeometry("no rays to triangulate".to_string()));
    }
    let mut a = na::Matrix3::<f64>::zeros();
    let mut b = na::Vector3::<f64>::zeros();
    for ray in rays {
        let d = ray.direction.into_inner().normalize();
        let projector = na::Matrix3::identity() - d * d.transpose();
        a += projector;
        b += projector * ray.origin.coords;
    }

    let svd = a.svd(true, true);
    let smallest = svd.singular_values.min();
    if !(smallest > SINGULAR_EPS * rays.len() as f64) {
        return Err(Error::InsufficientGeometry(format!(
            "{} ray(s) are parallel or too few (smallest eigenvalue {:e})",
            rays.len(),
            smallest
        )));
    }
    let x = svd
        .solve(&b, 0.0)
        .map_err(|e| Error::InsufficientGeometry(e.to_string()))?;
    Ok(na::Point3::from(x))
}

pub fn rms_ray_distance(rays: &[CameraRay], point: &na::Point3<f64>) -> f64 {
    if rays.is_empty() {
        return 0.0;
    }
    let ss: f64 = rays.iter().map(|r| r.distance_to(point).powi(2)).sum();
    (ss / rays.len() as f64).sqrt()
}

/// Rays grouped by bit-identical origin, in first-seen order.
fn group_by_origin(rays: &[CameraRay]) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<[u64; 3], usize> = BTreeMap::new();
    let mut out: Vec<Vec<usize>> = Vec::new();
    for (i, ray) in rays.iter().enumerate() {
        let key = [
            ray.origin.x.to_bits(),
            ray.origin.y.to_bits(),
            ray.origin.z.to_bits(),
        ];
        let slot = *groups.entry(key).or_insert_with(|| {
            out.push(Vec::new());
            out.len() - 1
        });
        out[slot].push(i);
    }
    out
}

/// Draws `num_samples` minimal samples, each taking rays from distinct
/// origins, and keeps the fitted points whose sample rays all pass within
/// `threshold` of them.
///
/// Sample `s` uses ChaCha stream `s` of `seed`, so the output is the same
/// however rayon schedules the work.
pub fn triangulate_candidates(
    rays: &[CameraRay],
    opts: &RobustRayOptions,
) -> Result<Vec<RayCandidate>> {
    let groups = group_by_origin(rays);
    let sample_size = opts.rays_per_sample.min(groups.len());
    if sample_size < 2 {
        return Err(Error::InsufficientGeometry(format!(
            "robust triangulation needs rays from 2 distinct origins, got {}",
            groups.len()
        )));
    }

    let candidates: Vec<RayCandidate> = (0..opts.num_samples)
        .into_par_iter()
        .filter_map(|s| {
            let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
            rng.set_stream(s as u64);
            let chosen: Vec<&Vec<usize>> = groups.choose_multiple(&mut rng, sample_size).collect();
            let sample: Vec<usize> = chosen
                .into_iter()
                .filter_map(|g| g.choose(&mut rng).copied())
                .collect();
            let sample_rays: Vec<CameraRay> = sample.iter().map(|&i| rays[i]).collect();
            let point = fit_point_to_rays(&sample_rays).ok()?;
            sample_rays
                .iter()
                .all(|r| r.distance_to(&point) < opts.threshold)
                .then_some(RayCandidate { point, sample })
        })
        .collect();
    debug!(
        "{} of {} ray samples were self-consistent",
        candidates.len(),
        opts.num_samples
    );
    Ok(candidates)
}

/// Picks the candidate supported by the most rays and refits on those rays.
pub fn triangulate_robust(rays: &[CameraRay], opts: &RobustRayOptions) -> Result<RayPoint> {
    let candidates = triangulate_candidates(rays, opts)?;

    let mut best: Option<(Vec<CameraRay>, f64, na::Point3<f64>)> = None;
    for candidate in &candidates {
        let inliers: Vec<CameraRay> = rays
            .iter()
            .filter(|r| r.distance_to(&candidate.point) < opts.threshold)
            .copied()
            .collect();
        let rms = rms_ray_distance(&inliers, &candidate.point);
        let better = match &best {
            None => true,
            Some((best_inliers, best_rms, _)) => {
                inliers.len() > best_inliers.len()
                    || (inliers.len() == best_inliers.len() && rms < *best_rms)
            }
        };
        if better {
            best = Some((inliers, rms, candidate.point));
        }
    }

    let Some((inliers, _, seed_point)) = best else {
        return Err(Error::NoConsensus(format!(
            "none of {} ray samples agreed within {}",
            opts.num_samples, opts.threshold
        )));
    };
    let point = fit_point_to_rays(&inliers).unwrap_or(seed_point);
    Ok(RayPoint {
        point,
        rms_distance: rms_ray_distance(&inliers, &point),
        support: inliers.len(),
    })
}

/// Triangulates one track, robustly when configured.
pub fn triangulate(rays: &[CameraRay], config: &TriangulationConfig, seed: u64) -> Result<RayPoint> {
    if config.robust {
        return triangulate_robust(rays, &RobustRayOptions::from_config(config, seed));
    }
    let point = fit_point_to_rays(rays)?;
    Ok(RayPoint {
        point,
        rms_distance: rms_ray_distance(rays, &point),
        support: rays.len(),
    })
}
