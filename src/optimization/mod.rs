pub mod assignment;
pub mod plane;
pub mod similarity;
pub mod triangulation;

pub use assignment::*;
pub use plane::*;
pub use similarity::*;
pub use triangulation::*;
