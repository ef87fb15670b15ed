use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::kml::Waypoint;
use crate::types::SimilarityTransform;

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: &Path, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    std::fs::write(output_path, j)?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Debug, Serialize)]
pub struct PointReport {
    pub object_id: u32,
    pub local: [f64; 3],
    pub rays: usize,
    pub rms_distance: f64,
}

#[derive(Debug, Serialize)]
pub struct FailureReport {
    pub object_id: u32,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RegistrationReport {
    pub transform: SimilarityTransform,
    pub cameras: usize,
    pub inliers: usize,
    pub rms_error: f64,
}

/// Summary of one `plan` run.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub timestamp_ms: i64,
    pub tracks: usize,
    pub points: Vec<PointReport>,
    pub failures: Vec<FailureReport>,
    pub registration: RegistrationReport,
    pub waypoints: Vec<Waypoint>,
}

pub fn write_report(output_path: &Path, report: &PlanReport) -> Result<()> {
    object_to_json(output_path, report)
}

/// Object id -> occurrences as `[image name, x_min, y_min, x_max, y_max]`.
pub type TrackDump = BTreeMap<u32, Vec<(String, [f64; 4])>>;
