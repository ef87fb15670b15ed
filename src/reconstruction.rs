use std::collections::HashMap;
use std::path::Path;

use log::info;
use nalgebra as na;

use crate::error::{Error, Result};
use crate::types::CameraRay;

/// One image of the reconstruction: pinhole intrinsics and a
/// camera-from-world pose `x_cam = R * x_world + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    pub image_id: u32,
    pub name: String,
    pub intrinsics: na::Matrix3<f64>,
    pub rotation: na::Rotation3<f64>,
    pub translation: na::Vector3<f64>,
    pub width: u32,
    pub height: u32,
    pub registered: bool,
}

impl CameraView {
    /// `C = -R^T t`.
    pub fn projection_center(&self) -> na::Point3<f64> {
        na::Point3::from(-(self.rotation.inverse() * self.translation))
    }

    /// World-frame ray from the projection center through `pixel`.
    pub fn ray_through(&self, pixel: &na::Point2<f64>) -> Result<CameraRay> {
        let k_inv = self.intrinsics.try_inverse().ok_or_else(|| {
            Error::InvalidReconstruction(format!("intrinsics of {} are singular", self.name))
        })?;
        let d_cam = k_inv * na::Vector3::new(pixel.x, pixel.y, 1.0);
        let d_world = self.rotation.inverse() * d_cam;
        Ok(CameraRay::new(self.projection_center(), d_world))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub views: Vec<CameraView>,
}

impl Reconstruction {
    pub fn new(views: Vec<CameraView>) -> Reconstruction {
        Reconstruction { views }
    }

    /// Looks a view up by exact image name, then by file stem, so that
    /// `IMG_0001.JPG` and `IMG_0001` resolve to the same camera.
    pub fn find(&self, name: &str) -> Option<&CameraView> {
        self.views.iter().find(|v| v.name == name).or_else(|| {
            let stem = file_stem(name);
            self.views.iter().find(|v| file_stem(&v.name) == stem)
        })
    }

    pub fn registered(&self) -> impl Iterator<Item = &CameraView> {
        self.views.iter().filter(|v| v.registered)
    }
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

struct Camera {
    width: u32,
    height: u32,
    intrinsics: na::Matrix3<f64>,
}

fn parse_values<T: std::str::FromStr>(tokens: &[&str], what: &str) -> Result<Vec<T>> {
    tokens
        .iter()
        .map(|t| {
            t.parse::<T>()
                .map_err(|_| Error::InvalidReconstruction(format!("bad {what} value {t:?}")))
        })
        .collect()
}

fn intrinsics_from_model(model: &str, params: &[f64]) -> Result<na::Matrix3<f64>> {
    let single_focal = matches!(
        model,
        "SIMPLE_PINHOLE" | "SIMPLE_RADIAL" | "RADIAL" | "SIMPLE_RADIAL_FISHEYE" | "RADIAL_FISHEYE"
    );
    let (fx, fy, cx, cy) = match (single_focal, params) {
        (true, [f, cx, cy, ..]) => (*f, *f, *cx, *cy),
        (false, [fx, fy, cx, cy, ..]) => (*fx, *fy, *cx, *cy),
        _ => {
            return Err(Error::InvalidReconstruction(format!(
                "camera model {model} with {} params",
                params.len()
            )));
        }
    };
    Ok(na::Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0))
}

fn content_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
}

/// Parses `cameras.txt`: `CAMERA_ID MODEL WIDTH HEIGHT PARAMS[]`.
fn parse_cameras(contents: &str) -> Result<HashMap<u32, Camera>> {
    let mut cameras = HashMap::new();
    for line in content_lines(contents).filter(|l| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 5 {
            return Err(Error::InvalidReconstruction(format!("camera line {line:?}")));
        }
        let id = parse_values::<u32>(&tokens[0..1], "camera id")?[0];
        let size = parse_values::<u32>(&tokens[2..4], "image size")?;
        let params = parse_values::<f64>(&tokens[4..], "camera parameter")?;
        cameras.insert(
            id,
            Camera {
                width: size[0],
                height: size[1],
                intrinsics: intrinsics_from_model(tokens[1], &params)?,
            },
        );
    }
    Ok(cameras)
}

/// Parses `images.txt`. Each image takes two lines; the second one lists
/// 2D points, may be empty, and is not needed here.
fn parse_images(contents: &str, cameras: &HashMap<u32, Camera>) -> Result<Vec<CameraView>> {
    let mut views = Vec::new();
    let mut lines = content_lines(contents);
    while let Some(line) = lines.next() {
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 10 {
            return Err(Error::InvalidReconstruction(format!("image line {line:?}")));
        }
        let image_id = parse_values::<u32>(&tokens[0..1], "image id")?[0];
        let pose = parse_values::<f64>(&tokens[1..8], "pose")?;
        let camera_id = parse_values::<u32>(&tokens[8..9], "camera id")?[0];
        let camera = cameras.get(&camera_id).ok_or_else(|| {
            Error::InvalidReconstruction(format!(
                "image {image_id} refers to unknown camera {camera_id}"
            ))
        })?;
        let q = na::UnitQuaternion::from_quaternion(na::Quaternion::new(
            pose[0], pose[1], pose[2], pose[3],
        ));
        views.push(CameraView {
            image_id,
            name: tokens[9..].join(" "),
            intrinsics: camera.intrinsics,
            rotation: q.to_rotation_matrix(),
            translation: na::Vector3::new(pose[4], pose[5], pose[6]),
            width: camera.width,
            height: camera.height,
            registered: true,
        });
        lines.next();
    }
    Ok(views)
}

/// Loads a COLMAP text model (`cameras.txt` and `images.txt`) from `dir`.
/// Every image listed in `images.txt` is registered.
pub fn load_colmap_text(dir: &Path) -> Result<Reconstruction> {
    let cameras = parse_cameras(&std::fs::read_to_string(dir.join("cameras.txt"))?)?;
    let views = parse_images(&std::fs::read_to_string(dir.join("images.txt"))?, &cameras)?;
    info!(
        "loaded {} cameras and {} images from {:?}",
        cameras.len(),
        views.len(),
        dir
    );
    Ok(Reconstruction::new(views))
}

/// Same as [`load_colmap_text`] on in-memory file contents.
pub fn parse_colmap_text(cameras_txt: &str, images_txt: &str) -> Result<Reconstruction> {
    let cameras = parse_cameras(cameras_txt)?;
    Ok(Reconstruction::new(parse_images(images_txt, &cameras)?))
}
