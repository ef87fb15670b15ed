use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use exif::{In, Tag, Value};
use glob::glob;
use image::ImageReader;
use indicatif::ParallelProgressIterator;
use log::{debug, info, trace};
use rayon::prelude::*;

use crate::appearance::AppearanceEncoder;
use crate::detected_points::{BBox, Detection, ImageDetections, NormalizedBox, parse_label_lines};
use crate::error::Result;
use crate::geodesy::dms_to_degrees;
use crate::types::Geodetic;

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        let lower = p.as_os_str().to_string_lossy().to_lowercase();
        for ext in &[".png", ".jpg", ".jpeg"] {
            if lower.ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Image files directly under `dir`, sorted by path.
pub fn image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*");
    let mut paths: Vec<PathBuf> = glob(&pattern.to_string_lossy())?
        .filter_map(img_filter)
        .collect();
    paths.sort();
    Ok(paths)
}

/// Reads a label file. A missing file means the detector found nothing.
pub fn read_labels(path: &Path) -> Result<Vec<NormalizedBox>> {
    if !path.exists() {
        trace!("no label file {:?}", path);
        return Ok(Vec::new());
    }
    parse_label_lines(&std::fs::read_to_string(path)?, path)
}

/// Label file of an image: `<labels_dir>/<image stem>.txt`.
pub fn label_path(labels_dir: &Path, image_name: &str) -> PathBuf {
    labels_dir.join(format!("{}.txt", file_stem(Path::new(image_name))))
}

/// All `*.txt` label files under `dir`, keyed by file stem.
pub fn load_label_dir(dir: &Path) -> Result<BTreeMap<String, Vec<NormalizedBox>>> {
    let pattern = dir.join("*.txt");
    let mut labels = BTreeMap::new();
    for path in glob(&pattern.to_string_lossy())?.filter_map(|p| p.ok()) {
        labels.insert(file_stem(&path), read_labels(&path)?);
    }
    debug!("{} label files in {:?}", labels.len(), dir);
    Ok(labels)
}

/// Loads every image under `images_dir`, keeps its `target_class` labels
/// from `detections_dir` and encodes each box with `encoder`.
///
/// Images are decoded and encoded in parallel; the output keeps the sorted
/// path order so downstream tracking is deterministic.
pub fn load_image_detections(
    images_dir: &Path,
    detections_dir: &Path,
    encoder: &dyn AppearanceEncoder,
    target_class: u32,
) -> Result<Vec<ImageDetections>> {
    let paths = image_paths(images_dir)?;
    let images: Vec<ImageDetections> = paths
        .par_iter()
        .progress_count(paths.len() as u64)
        .map(|path| -> Result<ImageDetections> {
            trace!("loading {:?}", path);
            let name = file_name(path);
            let img = ImageReader::open(path)?.decode()?;
            let (w, h) = (img.width(), img.height());
            let detections = read_labels(&label_path(detections_dir, &name))?
                .into_iter()
                .filter(|label| label.class_id == target_class)
                .map(|label| {
                    let bbox = BBox::from_normalized(&label, w as f64, h as f64);
                    Detection {
                        bbox,
                        class_id: label.class_id,
                        feature: encoder.encode(&img, &bbox),
                    }
                })
                .collect();
            Ok(ImageDetections {
                name,
                width: w,
                height: h,
                detections,
            })
        })
        .collect::<Result<_>>()?;
    info!(
        "loaded {} images with {} target detections",
        images.len(),
        images.iter().map(|i| i.detections.len()).sum::<usize>()
    );
    Ok(images)
}

fn rational_triplet(value: &Value) -> Option<[f64; 3]> {
    match value {
        Value::Rational(v) if v.len() >= 3 => Some([v[0].to_f64(), v[1].to_f64(), v[2].to_f64()]),
        _ => None,
    }
}

fn ascii_letter(value: &Value) -> Option<char> {
    match value {
        Value::Ascii(v) => v.first().and_then(|s| s.first()).map(|b| *b as char),
        _ => None,
    }
}

/// GPS position stored in the EXIF block of an image, if there is one.
pub fn read_geotag(path: &Path) -> Result<Option<Geodetic>> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);

    let (Some(lat), Some(lon)) = (
        field(Tag::GPSLatitude).and_then(rational_triplet),
        field(Tag::GPSLongitude).and_then(rational_triplet),
    ) else {
        return Ok(None);
    };
    let lat_ref = field(Tag::GPSLatitudeRef).and_then(ascii_letter).unwrap_or('N');
    let lon_ref = field(Tag::GPSLongitudeRef).and_then(ascii_letter).unwrap_or('E');
    let mut altitude = match field(Tag::GPSAltitude) {
        Some(Value::Rational(v)) if !v.is_empty() => v[0].to_f64(),
        _ => 0.0,
    };
    if let Some(Value::Byte(v)) = field(Tag::GPSAltitudeRef) {
        if v.first() == Some(&1) {
            altitude = -altitude;
        }
    }
    Ok(Some(Geodetic::new(
        dms_to_degrees(lat[0], lat[1], lat[2], lat_ref),
        dms_to_degrees(lon[0], lon[1], lon[2], lon_ref),
        altitude,
    )))
}

/// Geotags of every image under `images_dir`, keyed by file name.
/// Images without GPS data are skipped.
pub fn load_geotags(images_dir: &Path) -> Result<BTreeMap<String, Geodetic>> {
    let mut geotags = BTreeMap::new();
    for path in image_paths(images_dir)? {
        match read_geotag(&path)? {
            Some(g) => {
                geotags.insert(file_name(&path), g);
            }
            None => debug!("{:?} has no GPS tags, skipped for registration", path),
        }
    }
    info!("{} geotagged images in {:?}", geotags.len(), images_dir);
    Ok(geotags)
}
