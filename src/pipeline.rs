//! Stage orchestration: tracks -> rays -> local points -> ECEF -> waypoints.
//!
//! Every stage takes its collaborators as arguments; nothing is cached
//! between runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use nalgebra as na;

use crate::appearance::ColorHistogramEncoder;
use crate::config::{PipelineConfig, PlaneConfig, RegistrationConfig, TriangulationConfig};
use crate::data_loader::{load_geotags, load_image_detections, load_label_dir};
use crate::detected_points::{BBox, ImageDetections, NormalizedBox};
use crate::error::{Error, ErrorKind, Result};
use crate::geodesy::{ecef_to_geodetic, geodetic_to_ecef};
use crate::io::{
    FailureReport, PlanReport, PointReport, RegistrationReport, object_from_json, object_to_json,
};
use crate::kml::{Waypoint, waypoints_to_kmz};
use crate::optimization::{
    RansacSimilarityOptions, RayPoint, SimilarityFit, fit_all, fit_plane, ransac_similarity,
    snap_to_plane, triangulate,
};
use crate::reconstruction::{CameraView, Reconstruction, load_colmap_text};
use crate::tracking::{TrackTable, build_tracks, write_track_labels};
use crate::types::{CameraRay, Geodetic, SimilarityTransform};

/// Camera rays per object id.
pub type ObjectRays = BTreeMap<u32, Vec<CameraRay>>;

pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn push_ray(rays: &mut ObjectRays, object_id: u32, view: &CameraView, bbox: &BBox) -> Result<()> {
    let ray = view.ray_through(&bbox.center())?;
    rays.entry(object_id).or_default().push(ray);
    Ok(())
}

/// Rays through the box centers of every track occurrence.
pub fn track_rays(
    table: &TrackTable,
    images: &[ImageDetections],
    reconstruction: &Reconstruction,
) -> Result<ObjectRays> {
    let mut rays = ObjectRays::new();
    for track in table.iter() {
        for (image_idx, bbox) in &track.occurrences {
            let name = &images[*image_idx].name;
            match reconstruction.find(name).filter(|v| v.registered) {
                Some(view) => push_ray(&mut rays, track.id, view, bbox)?,
                None => warn!("{} is not registered, dropping its box of object {}", name, track.id),
            }
        }
    }
    Ok(rays)
}

/// Rays from track label files keyed by image stem, whose class column is
/// the object id. Boxes are scaled by the reconstruction camera size.
pub fn label_rays(
    labels: &BTreeMap<String, Vec<NormalizedBox>>,
    reconstruction: &Reconstruction,
) -> Result<ObjectRays> {
    let mut rays = ObjectRays::new();
    for (stem, boxes) in labels {
        let Some(view) = reconstruction.find(stem).filter(|v| v.registered) else {
            if !boxes.is_empty() {
                warn!("{} is not registered, skipping {} labels", stem, boxes.len());
            }
            continue;
        };
        for label in boxes {
            let bbox = BBox::from_normalized(label, view.width as f64, view.height as f64);
            push_ray(&mut rays, label.class_id, view, &bbox)?;
        }
    }
    Ok(rays)
}

/// Triangulates every object independently. A failing object is logged
/// and reported, the others carry on.
pub fn triangulate_objects(
    rays: &ObjectRays,
    config: &TriangulationConfig,
    seed: u64,
) -> (Vec<(u32, RayPoint)>, Vec<(u32, Error)>) {
    let mut points = Vec::new();
    let mut failures = Vec::new();
    for (&object_id, object_rays) in rays {
        match triangulate(object_rays, config, seed) {
            Ok(point) => points.push((object_id, point)),
            Err(e) => {
                warn!("object {} skipped: {}", object_id, e);
                failures.push((object_id, e));
            }
        }
    }
    info!(
        "triangulated {} of {} objects",
        points.len(),
        points.len() + failures.len()
    );
    (points, failures)
}

/// Moves the points onto their best-fit plane, lifted by `offset` toward
/// the cameras. Left untouched when no plane can be fitted.
pub fn snap_to_ground(
    points: &[na::Point3<f64>],
    camera_centers: &[na::Point3<f64>],
    config: &PlaneConfig,
) -> Vec<na::Point3<f64>> {
    if !config.enabled || camera_centers.is_empty() {
        return points.to_vec();
    }
    match fit_plane(points) {
        Ok(plane) => {
            let mean = camera_centers
                .iter()
                .fold(na::Vector3::zeros(), |acc, c| acc + c.coords)
                / camera_centers.len() as f64;
            let plane = plane.oriented_toward(&na::Point3::from(mean));
            snap_to_plane(points, &plane, config.offset)
        }
        Err(e) => {
            warn!("plane snapping skipped: {}", e);
            points.to_vec()
        }
    }
}

/// Registered projection centers paired with the ECEF position of their
/// geotag. Geotags are matched by image name, then by file stem.
pub fn registration_pairs(
    reconstruction: &Reconstruction,
    geotags: &BTreeMap<String, Geodetic>,
) -> (Vec<na::Point3<f64>>, Vec<na::Point3<f64>>) {
    let by_stem: BTreeMap<&str, &Geodetic> = geotags
        .iter()
        .map(|(name, g)| (name.rsplit_once('.').map_or(name.as_str(), |(s, _)| s), g))
        .collect();
    reconstruction
        .registered()
        .filter_map(|view| {
            let stem = view.name.rsplit_once('.').map_or(view.name.as_str(), |(s, _)| s);
            let geo = geotags.get(&view.name).or_else(|| by_stem.get(stem).copied())?;
            Some((view.projection_center(), geodetic_to_ecef(geo)))
        })
        .unzip()
}

/// Local -> ECEF similarity. A robust fit without consensus falls back to
/// the closed form on every pair.
pub fn register(
    source: &[na::Point3<f64>],
    target: &[na::Point3<f64>],
    config: &RegistrationConfig,
    seed: u64,
) -> Result<SimilarityFit> {
    let fit = if config.robust {
        let opts = RansacSimilarityOptions::from_config(config, seed);
        match ransac_similarity(source, target, &opts) {
            Err(e) if e.kind() == ErrorKind::Consensus => {
                warn!("{}, falling back to a fit on all cameras", e);
                fit_all(source, target, config.threshold)?
            }
            other => other?,
        }
    } else {
        fit_all(source, target, config.threshold)?
    };
    info!(
        "registration: scale {:.6}, {} / {} inliers, rms {:.3} m",
        fit.transform.scale,
        fit.inliers.len(),
        source.len(),
        fit.rms_error
    );
    Ok(fit)
}

pub fn to_geodetic(transform: &SimilarityTransform, local: &na::Point3<f64>) -> Geodetic {
    ecef_to_geodetic(&transform.apply(local))
}

/// One triangulated object on its way to a waypoint.
#[derive(Debug, Clone)]
pub struct ObjectPoint {
    pub object_id: u32,
    pub local: RayPoint,
    pub snapped: na::Point3<f64>,
    pub geodetic: Geodetic,
}

#[derive(Debug)]
pub struct Plan {
    pub points: Vec<ObjectPoint>,
    pub failures: Vec<(u32, Error)>,
    pub registration: SimilarityFit,
    pub cameras: usize,
    pub waypoints: Vec<Waypoint>,
}

impl Plan {
    pub fn report(&self, timestamp_ms: i64, tracks: usize) -> PlanReport {
        PlanReport {
            timestamp_ms,
            tracks,
            points: self
                .points
                .iter()
                .map(|p| PointReport {
                    object_id: p.object_id,
                    local: [p.local.point.x, p.local.point.y, p.local.point.z],
                    rays: p.local.support,
                    rms_distance: p.local.rms_distance,
                })
                .collect(),
            failures: self
                .failures
                .iter()
                .map(|(object_id, e)| FailureReport {
                    object_id: *object_id,
                    reason: e.to_string(),
                })
                .collect(),
            registration: RegistrationReport {
                transform: self.registration.transform.clone(),
                cameras: self.cameras,
                inliers: self.registration.inliers.len(),
                rms_error: self.registration.rms_error,
            },
            waypoints: self.waypoints.clone(),
        }
    }
}

/// Everything after tracking, in memory: triangulate, snap, register and
/// convert to waypoints ordered by object id.
pub fn plan_from_rays(
    rays: &ObjectRays,
    reconstruction: &Reconstruction,
    geotags: &BTreeMap<String, Geodetic>,
    config: &PipelineConfig,
) -> Result<Plan> {
    if rays.is_empty() {
        return Err(Error::EmptyInput("no object has a ray".to_string()));
    }
    let (located, failures) = triangulate_objects(rays, &config.triangulation, config.seed);
    if located.is_empty() {
        return Err(Error::EmptyInput(format!(
            "none of {} objects could be triangulated",
            failures.len()
        )));
    }

    let centers: Vec<na::Point3<f64>> = reconstruction
        .registered()
        .map(|v| v.projection_center())
        .collect();
    let local: Vec<na::Point3<f64>> = located.iter().map(|(_, p)| p.point).collect();
    let snapped = if local.len() >= 3 {
        snap_to_ground(&local, &centers, &config.plane)
    } else {
        local
    };

    let (source, target) = registration_pairs(reconstruction, geotags);
    let registration = register(&source, &target, &config.registration, config.seed)?;

    let points: Vec<ObjectPoint> = located
        .into_iter()
        .zip(snapped)
        .map(|((object_id, local), snapped)| ObjectPoint {
            object_id,
            geodetic: to_geodetic(&registration.transform, &snapped),
            local,
            snapped,
        })
        .collect();
    let waypoints = points
        .iter()
        .map(|p| Waypoint::from_geodetic(&p.geodetic))
        .collect();
    Ok(Plan {
        points,
        failures,
        registration,
        cameras: source.len(),
        waypoints,
    })
}

/// `track` stage: detections -> track table, label files and `tracks.json`.
pub fn run_track(
    images_dir: &Path,
    detections_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<TrackTable> {
    let encoder = ColorHistogramEncoder::new(config.tracking.histogram_bins);
    let images = load_image_detections(
        images_dir,
        detections_dir,
        &encoder,
        config.tracking.target_class,
    )?;
    let table = build_tracks(&images)?;
    write_track_labels(&table, &images, output_dir)?;
    object_to_json(&output_dir.join("tracks.json"), &table.to_dump(&images))?;
    Ok(table)
}

#[derive(Debug, Clone)]
pub struct PlanPaths {
    pub images: PathBuf,
    pub labels: PathBuf,
    pub reconstruction: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
}

/// `plan` stage: track labels + reconstruction + geotags -> KMZ.
pub fn run_plan(paths: &PlanPaths, config: &PipelineConfig) -> Result<PlanReport> {
    let reconstruction = load_colmap_text(&paths.reconstruction)?;
    let labels = load_label_dir(&paths.labels)?;
    let geotags = load_geotags(&paths.images)?;
    let rays = label_rays(&labels, &reconstruction)?;
    let plan = plan_from_rays(&rays, &reconstruction, &geotags, config)?;

    let timestamp_ms = now_ms();
    waypoints_to_kmz(
        &paths.template,
        &paths.output,
        &plan.waypoints,
        &config.kml,
        timestamp_ms,
    )?;
    Ok(plan.report(timestamp_ms, rays.len()))
}

/// `kmz` stage: waypoint JSON -> KMZ.
pub fn run_kmz(
    waypoints_path: &Path,
    template: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<usize> {
    let waypoints: Vec<Waypoint> = object_from_json(waypoints_path)?;
    waypoints_to_kmz(template, output, &waypoints, &config.kml, now_ms())?;
    Ok(waypoints.len())
}
