mod algorithm;
mod bbox;
mod geom;

pub(crate) use bbox::{envelope_of, BoundingBox};
pub use algorithm::apportion::{apportion, clip, Piece};
pub use algorithm::circle::circle;
pub use algorithm::repair::repair;
pub use geom::Geometries;
