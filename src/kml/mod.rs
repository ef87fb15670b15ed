//! WPML mission documents: template editing and KMZ packaging.

pub mod kmz;
pub mod placemark;
pub mod tree;
pub mod waypoint;

pub use kmz::*;
pub use placemark::*;
pub use tree::{Document, Element, LOOKUP_ORDER, Lookup, Node};
pub use waypoint::*;
