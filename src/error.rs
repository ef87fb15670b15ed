use std::path::PathBuf;

use thiserror::Error;

/// Errors produced anywhere in the detection-to-waypoint pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("{stage} needs at least {required} points, got {actual}")]
    NotEnoughPoints {
        stage: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("paired point sets differ in length: {source_len} vs {target_len}")]
    MismatchedLengths { source_len: usize, target_len: usize },

    #[error("feature vector has dimension {actual}, expected {expected}")]
    FeatureDimension { expected: usize, actual: usize },

    #[error("invalid label in {path}:{line}: {reason}")]
    InvalidLabel {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid reconstruction: {0}")]
    InvalidReconstruction(String),

    #[error("template is missing required element <{0}>")]
    MissingElement(String),

    #[error("template is missing required file {0}")]
    MissingTemplateFile(String),

    #[error("insufficient geometry: {0}")]
    InsufficientGeometry(String),

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("no consensus: {0}")]
    NoConsensus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Exif(#[from] exif::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

/// Coarse classification of [`Error`], used by callers to decide whether to
/// abort, skip a track, or fall back to a non-robust estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Geometry,
    Consensus,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyInput(_)
            | Error::NotEnoughPoints { .. }
            | Error::MismatchedLengths { .. }
            | Error::FeatureDimension { .. }
            | Error::InvalidLabel { .. }
            | Error::InvalidReconstruction(_)
            | Error::MissingElement(_)
            | Error::MissingTemplateFile(_)
            | Error::Json(_)
            | Error::Xml(_)
            | Error::Glob(_) => ErrorKind::Input,
            Error::InsufficientGeometry(_) | Error::DegenerateInput(_) => ErrorKind::Geometry,
            Error::NoConsensus(_) => ErrorKind::Consensus,
            Error::Io(_) | Error::Zip(_) | Error::Exif(_) | Error::Image(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
