use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Line of sight from a camera projection center.
///
/// The direction is normalized on construction; callers never have to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRay {
    pub origin: na::Point3<f64>,
    pub direction: na::Unit<na::Vector3<f64>>,
}

impl CameraRay {
    pub fn new(origin: na::Point3<f64>, direction: na::Vector3<f64>) -> CameraRay {
        CameraRay {
            origin,
            direction: na::Unit::new_normalize(direction),
        }
    }

    /// Perpendicular distance from `point` to the supporting line.
    pub fn distance_to(&self, point: &na::Point3<f64>) -> f64 {
        self.direction.cross(&(*point - self.origin)).norm()
    }
}

/// Uniform-scale rigid transform `x -> scale * R * x + t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTransform {
    pub scale: f64,
    pub rotation: na::Rotation3<f64>,
    pub translation: na::Vector3<f64>,
}

impl SimilarityTransform {
    pub fn new(
        scale: f64,
        rotation: na::Rotation3<f64>,
        translation: na::Vector3<f64>,
    ) -> SimilarityTransform {
        SimilarityTransform {
            scale,
            rotation,
            translation,
        }
    }

    pub fn identity() -> SimilarityTransform {
        SimilarityTransform::new(1.0, na::Rotation3::identity(), na::Vector3::zeros())
    }

    pub fn apply(&self, p: &na::Point3<f64>) -> na::Point3<f64> {
        na::Point3::from(self.scale * (self.rotation * p.coords) + self.translation)
    }
}

/// WGS84 latitude/longitude in degrees, altitude in meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geodetic {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Geodetic {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Geodetic {
        Geodetic {
            latitude,
            longitude,
            altitude,
        }
    }
}
