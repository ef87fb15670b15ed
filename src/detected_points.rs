use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis-aligned box in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> BBox {
        BBox {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn center(&self) -> na::Point2<f64> {
        na::Point2::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Builds a pixel box from a normalized `(cx, cy, w, h)` label.
    pub fn from_normalized(label: &NormalizedBox, img_w: f64, img_h: f64) -> BBox {
        let cx = label.cx * img_w;
        let cy = label.cy * img_h;
        let half_w = label.w * img_w / 2.0;
        let half_h = label.h * img_h / 2.0;
        BBox::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    pub fn to_normalized(&self, class_id: u32, img_w: f64, img_h: f64) -> NormalizedBox {
        let c = self.center();
        NormalizedBox {
            class_id,
            cx: c.x / img_w,
            cy: c.y / img_h,
            w: self.width() / img_w,
            h: self.height() / img_h,
        }
    }
}

/// One line of a label file: class id and a box normalized to the image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub class_id: u32,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl NormalizedBox {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.class_id, self.cx, self.cy, self.w, self.h
        )
    }
}

/// Parses `class cx cy w h` lines. Blank lines are skipped.
///
/// Class ids are accepted in float notation (`1.0`) since some detectors
/// write them that way.
pub fn parse_label_lines(contents: &str, path: &Path) -> Result<Vec<NormalizedBox>> {
    let mut boxes = Vec::new();
    for (line_idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let invalid = |reason: String| Error::InvalidLabel {
            path: path.to_path_buf(),
            line: line_idx + 1,
            reason,
        };
        let values: Vec<f64> = line
            .split_whitespace()
            .map(|s| s.parse::<f64>().map_err(|e| invalid(format!("{s:?}: {e}"))))
            .collect::<Result<_>>()?;
        if values.len() != 5 {
            return Err(invalid(format!("expected 5 fields, got {}", values.len())));
        }
        if values[0] < 0.0 || values[0].fract() != 0.0 {
            return Err(invalid(format!("class id {} is not a whole number", values[0])));
        }
        boxes.push(NormalizedBox {
            class_id: values[0] as u32,
            cx: values[1],
            cy: values[2],
            w: values[3],
            h: values[4],
        });
    }
    Ok(boxes)
}

/// A detector hit together with its appearance descriptor.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox,
    pub class_id: u32,
    pub feature: na::DVector<f64>,
}

/// All target-class detections of one image.
#[derive(Debug, Clone)]
pub struct ImageDetections {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
}
