use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, trace};
use nalgebra as na;
use rayon::prelude::*;

use crate::detected_points::{BBox, ImageDetections};
use crate::error::{Error, Result};
use crate::io::TrackDump;
use crate::optimization::{euclidean_cost_matrix, min_cost_assignment};

/// One physical object seen across images.
///
/// `occurrences` holds `(image index, box)` pairs with at most one box per
/// image, ordered by image index.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: u32,
    pub occurrences: Vec<(usize, BBox)>,
}

impl Track {
    pub fn contains_image(&self, image_idx: usize) -> bool {
        self.occurrences.iter().any(|(i, _)| *i == image_idx)
    }
}

/// Object id -> track, plus the number of detections no track claimed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTable {
    pub tracks: BTreeMap<u32, Track>,
    pub unassigned: usize,
}

impl TrackTable {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Serializable view keyed by image name instead of index.
    pub fn to_dump(&self, images: &[ImageDetections]) -> TrackDump {
        self.tracks
            .iter()
            .map(|(id, track)| {
                let occurrences = track
                    .occurrences
                    .iter()
                    .map(|(i, b)| (images[*i].name.clone(), [b.x_min, b.y_min, b.x_max, b.y_max]))
                    .collect();
                (*id, occurrences)
            })
            .collect()
    }
}

/// First image holding the most detections.
fn anchor_image(images: &[ImageDetections]) -> usize {
    let mut anchor = 0;
    for (i, img) in images.iter().enumerate() {
        if img.detections.len() > images[anchor].detections.len() {
            anchor = i;
        }
    }
    anchor
}

fn check_dimensions(images: &[ImageDetections]) -> Result<()> {
    let mut features = images
        .iter()
        .flat_map(|img| img.detections.iter().map(|d| d.feature.len()));
    let Some(expected) = features.next() else {
        return Ok(());
    };
    match features.find(|&len| len != expected) {
        Some(actual) => Err(Error::FeatureDimension { expected, actual }),
        None => Ok(()),
    }
}

struct Builder<'a> {
    images: &'a [ImageDetections],
    /// Position in processing order -> original image index.
    order: Vec<usize>,
    /// Object id per detection, indexed by processing position.
    ids: Vec<Vec<Option<u32>>>,
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
}

impl Builder<'_> {
    fn mint(&mut self, pos: usize, det: usize) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let image_idx = self.order[pos];
        self.ids[pos][det] = Some(id);
        self.tracks.insert(
            id,
            Track {
                id,
                occurrences: vec![(image_idx, self.images[image_idx].detections[det].bbox)],
            },
        );
        id
    }

    fn propagate(&mut self, id: u32, pos: usize, det: usize) {
        if self.ids[pos][det].is_some() {
            return;
        }
        let image_idx = self.order[pos];
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };
        if track.contains_image(image_idx) {
            trace!(
                "object {} already has a box in {}, leaving detection {} unassigned",
                id, self.images[image_idx].name, det
            );
            return;
        }
        track
            .occurrences
            .push((image_idx, self.images[image_idx].detections[det].bbox));
        self.ids[pos][det] = Some(id);
    }
}

/// Builds object tracks across all images.
///
/// The image with the most detections is processed first and every one of
/// its detections opens a track. Every pair `(i, j)`, `i < j` in that order,
/// is then matched with an optimal assignment on feature distance and ids
/// are propagated greedily from `i` to `j` in scan order. A track never
/// takes two boxes from the same image; a detection that would break this
/// is left unassigned.
pub fn build_tracks(images: &[ImageDetections]) -> Result<TrackTable> {
    let total: usize = images.iter().map(|img| img.detections.len()).sum();
    if total == 0 {
        return Err(Error::EmptyInput(format!(
            "no detections in any of {} images",
            images.len()
        )));
    }
    check_dimensions(images)?;

    let anchor = anchor_image(images);
    let order: Vec<usize> = std::iter::once(anchor)
        .chain((0..images.len()).filter(|&i| i != anchor))
        .collect();
    debug!(
        "anchor image {} with {} detections",
        images[anchor].name,
        images[anchor].detections.len()
    );

    let pairs: Vec<(usize, usize)> = (0..order.len())
        .flat_map(|a| (a + 1..order.len()).map(move |b| (a, b)))
        .filter(|&(a, b)| {
            !images[order[a]].detections.is_empty() && !images[order[b]].detections.is_empty()
        })
        .collect();
    let matches: Vec<Vec<(usize, usize)>> = pairs
        .par_iter()
        .map(|&(a, b)| {
            let fa: Vec<&na::DVector<f64>> =
                images[order[a]].detections.iter().map(|d| &d.feature).collect();
            let fb: Vec<&na::DVector<f64>> =
                images[order[b]].detections.iter().map(|d| &d.feature).collect();
            min_cost_assignment(&euclidean_cost_matrix(&fa, &fb))
        })
        .collect::<Result<_>>()?;

    let mut builder = Builder {
        images,
        ids: order
            .iter()
            .map(|&i| vec![None; images[i].detections.len()])
            .collect(),
        order,
        tracks: BTreeMap::new(),
        next_id: 0,
    };
    for det in 0..images[anchor].detections.len() {
        builder.mint(0, det);
    }
    for (&(a, b), matched) in pairs.iter().zip(&matches) {
        for &(r, c) in matched {
            let id = match builder.ids[a][r] {
                Some(id) => id,
                None => builder.mint(a, r),
            };
            builder.propagate(id, b, c);
        }
    }

    let unassigned = builder.ids.iter().flatten().filter(|id| id.is_none()).count();
    let mut tracks = builder.tracks;
    for track in tracks.values_mut() {
        track.occurrences.sort_by_key(|(i, _)| *i);
    }
    info!(
        "{} tracks from {} detections in {} images ({} unassigned)",
        tracks.len(),
        total,
        images.len(),
        unassigned
    );
    Ok(TrackTable { tracks, unassigned })
}

/// Writes one label file per image, `<stem>.txt`, whose class column is the
/// object id. Images without any tracked box get an empty file.
pub fn write_track_labels(
    table: &TrackTable,
    images: &[ImageDetections],
    output_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let mut lines: Vec<Vec<String>> = vec![Vec::new(); images.len()];
    for track in table.iter() {
        for (image_idx, bbox) in &track.occurrences {
            let img = &images[*image_idx];
            let label = bbox.to_normalized(track.id, img.width as f64, img.height as f64);
            lines[*image_idx].push(label.to_line());
        }
    }
    for (img, image_lines) in images.iter().zip(lines) {
        let stem = Path::new(&img.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| img.name.clone());
        let mut contents = image_lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(output_dir.join(format!("{stem}.txt")), contents)?;
    }
    info!("wrote track labels for {} images to {:?}", images.len(), output_dir);
    Ok(())
}
