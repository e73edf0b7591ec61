//! Regular-grid tilings of valued polygons.
//!
//! A tiling splits the bounding rectangle of an extent into `rows × cols`
//! slots, clips each slot to the extent, and keeps the slots that overlap at
//! least one source polygon. Each surviving cell stores its aggregate value,
//! its neighbors, and a blob with the source pieces that fall inside it.

mod build;
mod cell;
mod grid;
mod index;

pub use build::{BuiltTiling, TileIndexBuilder};
pub use cell::{DetailRecord, GridCell, SourceFeature};
pub use grid::Grid;
pub use index::GridIndex;
