use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use glob::glob;
use log::{debug, info};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::placemark::{SynthesisOptions, edit_placemarks};
use super::waypoint::Waypoint;
use crate::config::KmlConfig;
use crate::error::{Error, Result};

pub const TEMPLATE_KML: &str = "template.kml";
pub const WAYLINES_WPML: &str = "waylines.wpml";

/// Documents and companion files of a mission template.
#[derive(Debug, Clone, Default)]
pub struct TemplateBundle {
    pub kml: String,
    pub waylines: Option<String>,
    /// Every other entry, with its archive path.
    pub others: Vec<(String, Vec<u8>)>,
}

fn archive_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

impl TemplateBundle {
    /// Loads a template from a `.kmz` archive or from a directory holding
    /// `<folder_name>/template.kml` (or `template.kml` directly).
    pub fn load(path: &Path, folder_name: &str) -> Result<TemplateBundle> {
        if path.is_dir() {
            TemplateBundle::from_dir(path, folder_name)
        } else {
            TemplateBundle::from_kmz(path)
        }
    }

    pub fn from_dir(dir: &Path, folder_name: &str) -> Result<TemplateBundle> {
        let nested = dir.join(folder_name);
        let base = if nested.join(TEMPLATE_KML).is_file() {
            nested
        } else {
            dir.to_path_buf()
        };
        let kml_path = base.join(TEMPLATE_KML);
        if !kml_path.is_file() {
            return Err(Error::MissingTemplateFile(kml_path.display().to_string()));
        }
        let waylines_path = base.join(WAYLINES_WPML);
        let waylines = if waylines_path.is_file() {
            Some(std::fs::read_to_string(&waylines_path)?)
        } else {
            None
        };

        let mut others = Vec::new();
        let mut files: Vec<PathBuf> = glob(&base.join("**").join("*").to_string_lossy())?
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file() && *p != kml_path && *p != waylines_path)
            .collect();
        files.sort();
        for file in files {
            let rel = file.strip_prefix(&base).unwrap_or(&file);
            others.push((
                format!("{folder_name}/{}", archive_path(rel)),
                std::fs::read(&file)?,
            ));
        }

        Ok(TemplateBundle {
            kml: std::fs::read_to_string(&kml_path)?,
            waylines,
            others,
        })
    }

    pub fn from_kmz(path: &Path) -> Result<TemplateBundle> {
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut bundle = TemplateBundle::default();
        let mut kml = None;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            match entry_file_name(&name) {
                TEMPLATE_KML if kml.is_none() => {
                    kml = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                WAYLINES_WPML if bundle.waylines.is_none() => {
                    bundle.waylines = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                _ => bundle.others.push((name, bytes)),
            }
        }
        bundle.kml = kml.ok_or_else(|| {
            Error::MissingTemplateFile(format!("{TEMPLATE_KML} in {}", path.display()))
        })?;
        debug!(
            "template {:?}: waylines {}, {} other entries",
            path,
            bundle.waylines.is_some(),
            bundle.others.len()
        );
        Ok(bundle)
    }

    /// Archive entries with both documents rewritten for `waypoints`.
    pub fn synthesize(
        &self,
        waypoints: &[Waypoint],
        opts: &SynthesisOptions,
        folder_name: &str,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = vec![(
            format!("{folder_name}/{TEMPLATE_KML}"),
            edit_placemarks(&self.kml, waypoints, opts)?.into_bytes(),
        )];
        if let Some(waylines) = &self.waylines {
            entries.push((
                format!("{folder_name}/{WAYLINES_WPML}"),
                edit_placemarks(waylines, waypoints, opts)?.into_bytes(),
            ));
        }
        entries.extend(self.others.iter().cloned());
        Ok(entries)
    }
}

/// Writes deflated entries to `output`.
///
/// The archive is built in a temporary file next to `output` and renamed
/// over it only once complete; on error the temporary file is removed.
pub fn write_kmz(output: &Path, entries: &[(String, Vec<u8>)]) -> Result<()> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| e.error)?;
    info!("wrote {} entries to {:?}", entries.len(), output);
    Ok(())
}

/// Loads the template at `template`, rewrites it for `waypoints` and
/// writes the archive to `output`.
pub fn waypoints_to_kmz(
    template: &Path,
    output: &Path,
    waypoints: &[Waypoint],
    config: &KmlConfig,
    timestamp_ms: i64,
) -> Result<()> {
    let bundle = TemplateBundle::load(template, &config.folder_name)?;
    let opts = SynthesisOptions::from_config(config, timestamp_ms);
    let entries = bundle.synthesize(waypoints, &opts, &config.folder_name)?;
    write_kmz(output, &entries)
}
