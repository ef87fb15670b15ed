use nalgebra as na;

use crate::error::{Error, Result};

const FLATNESS_EPS: f64 = 1e-12;

/// Plane through `centroid` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub centroid: na::Point3<f64>,
    pub normal: na::Unit<na::Vector3<f64>>,
}

impl Plane {
    pub fn signed_distance(&self, p: &na::Point3<f64>) -> f64 {
        self.normal.dot(&(*p - self.centroid))
    }

    pub fn project(&self, p: &na::Point3<f64>) -> na::Point3<f64> {
        *p - self.normal.into_inner() * self.signed_distance(p)
    }

    /// Flips the normal, if needed, so that `toward` lies on its positive side.
    pub fn oriented_toward(self, toward: &na::Point3<f64>) -> Plane {
        if self.signed_distance(toward) < 0.0 {
            Plane {
                centroid: self.centroid,
                normal: -self.normal,
            }
        } else {
            self
        }
    }
}

/// Total-least-squares plane: the normal is the eigenvector of the scatter
/// matrix with the smallest eigenvalue.
pub fn fit_plane(points: &[na::Point3<f64>]) -> Result<Plane> {
    if points.len() < 3 {
        return Err(Error::NotEnoughPoints {
            stage: "plane fit",
            required: 3,
            actual: points.len(),
        });
    }
    let mean = points
        .iter()
        .fold(na::Vector3::zeros(), |acc, p| acc + p.coords)
        / points.len() as f64;
    let scatter = points.iter().fold(na::Matrix3::zeros(), |acc, p| {
        let c = p.coords - mean;
        acc + c * c.transpose()
    });

    let eigen = na::SymmetricEigen::new(scatter);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let largest = eigen.eigenvalues[order[2]];
    if !(eigen.eigenvalues[order[1]] > FLATNESS_EPS * largest.max(1.0)) {
        return Err(Error::DegenerateInput(
            "points are collinear or coincident, plane is undefined".to_string(),
        ));
    }
    let normal = eigen.eigenvectors.column(order[0]).into_owned();
    Ok(Plane {
        centroid: na::Point3::from(mean),
        normal: na::Unit::new_normalize(normal),
    })
}

/// Projects every point onto `plane`, then moves it `offset` along the normal.
pub fn snap_to_plane(points: &[na::Point3<f64>], plane: &Plane, offset: f64) -> Vec<na::Point3<f64>> {
    points
        .iter()
        .map(|p| plane.project(p) + plane.normal.into_inner() * offset)
        .collect()
}
