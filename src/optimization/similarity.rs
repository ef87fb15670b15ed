use log::debug;
use nalgebra as na;
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::types::SimilarityTransform;

const MIN_POINTS: usize = 3;
const VARIANCE_EPS: f64 = 1e-24;

/// Similarity transform and the correspondences that support it.
#[derive(Debug, Clone)]
pub struct SimilarityFit {
    pub transform: SimilarityTransform,
    pub inliers: Vec<usize>,
    pub rms_error: f64,
}

#[derive(Debug, Clone)]
pub struct RansacSimilarityOptions {
    pub max_iters: usize,
    pub threshold: f64,
    pub seed: u64,
}

impl RansacSimilarityOptions {
    pub fn from_config(config: &RegistrationConfig, seed: u64) -> RansacSimilarityOptions {
        RansacSimilarityOptions {
            max_iters: config.max_iters,
            threshold: config.threshold,
            seed,
        }
    }
}

fn check_pairs(source: &[na::Point3<f64>], target: &[na::Point3<f64>]) -> Result<()> {
    if source.len() != target.len() {
        return Err(Error::MismatchedLengths {
            source_len: source.len(),
            target_len: target.len(),
        });
    }
    if source.len() < MIN_POINTS {
        return Err(Error::NotEnoughPoints {
            stage: "similarity registration",
            required: MIN_POINTS,
            actual: source.len(),
        });
    }
    Ok(())
}

fn centroid(points: &[na::Point3<f64>]) -> na::Vector3<f64> {
    points
        .iter()
        .fold(na::Vector3::zeros(), |acc, p| acc + p.coords)
        / points.len() as f64
}

/// Closed-form least-squares similarity (Umeyama) mapping `source` onto
/// `target`. Reflections are folded back into a proper rotation.
pub fn estimate_similarity(
    source: &[na::Point3<f64>],
    target: &[na::Point3<f64>],
) -> Result<SimilarityTransform> {
    check_pairs(source, target)?;
    let n = source.len() as f64;
    let src_mean = centroid(source);
    let tgt_mean = centroid(target);

    let mut cross = na::Matrix3::<f64>::zeros();
    let mut src_var = 0.0;
    for (s, t) in source.iter().zip(target) {
        let sc = s.coords - src_mean;
        let tc = t.coords - tgt_mean;
        cross += sc * tc.transpose();
        src_var += sc.norm_squared();
    }
    if src_var / n < VARIANCE_EPS {
        return Err(Error::DegenerateInput(
            "source points have zero variance".to_string(),
        ));
    }

    let svd = cross.svd(true, true);
    let (Some(u), Some(mut v_t)) = (svd.u, svd.v_t) else {
        return Err(Error::DegenerateInput(
            "svd of cross-covariance failed".to_string(),
        ));
    };
    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let weakest = svd.singular_values.imin();
        v_t.row_mut(weakest).neg_mut();
        r = v_t.transpose() * u.transpose();
    }

    let mut aligned = 0.0;
    for (s, t) in source.iter().zip(target) {
        aligned += (t.coords - tgt_mean).dot(&(r * (s.coords - src_mean)));
    }
    let scale = aligned / src_var;
    let translation = tgt_mean - scale * (r * src_mean);

    Ok(SimilarityTransform::new(
        scale,
        na::Rotation3::from_matrix_unchecked(r),
        translation,
    ))
}

pub fn residuals(
    transform: &SimilarityTransform,
    source: &[na::Point3<f64>],
    target: &[na::Point3<f64>],
) -> Vec<f64> {
    source
        .iter()
        .zip(target)
        .map(|(s, t)| (transform.apply(s) - t).norm())
        .collect()
}

fn score(
    transform: SimilarityTransform,
    source: &[na::Point3<f64>],
    target: &[na::Point3<f64>],
    threshold: f64,
) -> SimilarityFit {
    let errors = residuals(&transform, source, target);
    let inliers: Vec<usize> = errors
        .iter()
        .enumerate()
        .filter(|(_, e)| **e < threshold)
        .map(|(i, _)| i)
        .collect();
    let rms_error = if inliers.is_empty() {
        f64::INFINITY
    } else {
        (inliers.iter().map(|&i| errors[i] * errors[i]).sum::<f64>() / inliers.len() as f64).sqrt()
    };
    SimilarityFit {
        transform,
        inliers,
        rms_error,
    }
}

fn is_better(candidate: &SimilarityFit, best: &SimilarityFit) -> bool {
    candidate.inliers.len() > best.inliers.len()
        || (candidate.inliers.len() == best.inliers.len() && candidate.rms_error < best.rms_error)
}

/// Closed-form fit on every pair, scored with `threshold`.
pub fn fit_all(
    source: &[na::Point3<f64>],
    target: &[na::Point3<f64>],
    threshold: f64,
) -> Result<SimilarityFit> {
    let transform = estimate_similarity(source, target)?;
    Ok(score(transform, source, target, threshold))
}

/// RANSAC over minimal 3-point samples, keeping the model with the most
/// inliers and refitting it on them.
pub fn ransac_similarity(
    source: &[na::Point3<f64>],
    target: &[na::Point3<f64>],
    opts: &RansacSimilarityOptions,
) -> Result<SimilarityFit> {
    check_pairs(source, target)?;

    let best = (0..opts.max_iters)
        .into_par_iter()
        .filter_map(|iter| {
            let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
            rng.set_stream(iter as u64);
            let idx = index::sample(&mut rng, source.len(), MIN_POINTS).into_vec();
            let src: Vec<_> = idx.iter().map(|&i| source[i]).collect();
            let tgt: Vec<_> = idx.iter().map(|&i| target[i]).collect();
            let transform = estimate_similarity(&src, &tgt).ok()?;
            let fit = score(transform, source, target, opts.threshold);
            (!fit.inliers.is_empty()).then_some((iter, fit))
        })
        .reduce_with(|a, b| {
            if is_better(&b.1, &a.1) || (!is_better(&a.1, &b.1) && b.0 < a.0) {
                b
            } else {
                a
            }
        });

    let Some((_, best)) = best else {
        return Err(Error::NoConsensus(format!(
            "no similarity model out of {} samples had an inlier within {}",
            opts.max_iters, opts.threshold
        )));
    };
    debug!(
        "ransac similarity: {} / {} inliers",
        best.inliers.len(),
        source.len()
    );

    if best.inliers.len() < MIN_POINTS {
        return Ok(best);
    }
    let src: Vec<_> = best.inliers.iter().map(|&i| source[i]).collect();
    let tgt: Vec<_> = best.inliers.iter().map(|&i| target[i]).collect();
    match estimate_similarity(&src, &tgt) {
        Ok(refit) => {
            let refit = score(refit, source, target, opts.threshold);
            Ok(if is_better(&best, &refit) { best } else { refit })
        }
        Err(_) => Ok(best),
    }
}
