use image::{DynamicImage, GenericImageView};
use nalgebra as na;

use crate::detected_points::BBox;

/// Maps an image crop to a fixed-length appearance descriptor.
///
/// Tracking only ever compares descriptors by Euclidean distance, so any
/// embedding works as long as every call returns `dimension()` values.
pub trait AppearanceEncoder: Sync {
    fn dimension(&self) -> usize;
    fn encode(&self, image: &DynamicImage, bbox: &BBox) -> na::DVector<f64>;
}

/// Concatenated per-channel RGB histogram, L1-normalized per channel.
#[derive(Debug, Clone)]
pub struct ColorHistogramEncoder {
    pub bins: usize,
}

impl ColorHistogramEncoder {
    pub fn new(bins: usize) -> ColorHistogramEncoder {
        ColorHistogramEncoder { bins: bins.max(1) }
    }
}

/// Clamps a box to the image and returns `(x, y, w, h)` in whole pixels.
fn crop_rect(img_w: u32, img_h: u32, bbox: &BBox) -> Option<(u32, u32, u32, u32)> {
    let x0 = bbox.x_min.floor().clamp(0.0, img_w as f64) as u32;
    let y0 = bbox.y_min.floor().clamp(0.0, img_h as f64) as u32;
    let x1 = bbox.x_max.ceil().clamp(0.0, img_w as f64) as u32;
    let y1 = bbox.y_max.ceil().clamp(0.0, img_h as f64) as u32;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1 - x0, y1 - y0))
}

impl AppearanceEncoder for ColorHistogramEncoder {
    fn dimension(&self) -> usize {
        3 * self.bins
    }

    fn encode(&self, image: &DynamicImage, bbox: &BBox) -> na::DVector<f64> {
        let mut hist = na::DVector::zeros(self.dimension());
        let Some((x, y, w, h)) = crop_rect(image.width(), image.height(), bbox) else {
            return hist;
        };
        let crop = image.view(x, y, w, h).to_image();
        let rgb = DynamicImage::ImageRgba8(crop).to_rgb8();
        for px in rgb.pixels() {
            for (channel, value) in px.0.iter().enumerate() {
                let bin = (*value as usize * self.bins / 256).min(self.bins - 1);
                hist[channel * self.bins + bin] += 1.0;
            }
        }
        let count = (w as f64) * (h as f64);
        hist /= count;
        hist
    }
}
