use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::object_from_json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Detector class that takes part in matching.
    pub target_class: u32,
    /// Histogram bins per color channel for the built-in encoder.
    pub histogram_bins: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            target_class: 1,
            histogram_bins: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    pub robust: bool,
    pub num_samples: usize,
    pub rays_per_sample: usize,
    /// Max perpendicular ray distance, in reconstruction units.
    pub threshold: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            robust: false,
            num_samples: 1000,
            rays_per_sample: 5,
            threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub robust: bool,
    pub max_iters: usize,
    /// Inlier distance in meters (ECEF).
    pub threshold: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            robust: false,
            max_iters: 1000,
            threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    pub enabled: bool,
    pub offset: f64,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            offset: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmlConfig {
    pub author: String,
    /// Folder name of the documents inside the archive.
    pub folder_name: String,
    pub wpml_namespace: String,
    pub default_height: f64,
}

impl Default for KmlConfig {
    fn default() -> Self {
        Self {
            author: "detection-waypoints".to_string(),
            folder_name: "wpmz".to_string(),
            wpml_namespace: "http://www.dji.com/wpmz/1.0.6".to_string(),
            default_height: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub seed: u64,
    pub tracking: TrackingConfig,
    pub triangulation: TriangulationConfig,
    pub registration: RegistrationConfig,
    pub plane: PlaneConfig,
    pub kml: KmlConfig,
}

impl PipelineConfig {
    /// Reads a config file, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<PipelineConfig> {
        match path {
            Some(p) => object_from_json(p),
            None => Ok(PipelineConfig::default()),
        }
    }
}
