pub mod appearance;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod error;
pub mod geodesy;
pub mod io;
pub mod kml;
pub mod optimization;
pub mod pipeline;
pub mod reconstruction;
pub mod tracking;
pub mod types;

pub use error::{Error, ErrorKind, Result};
