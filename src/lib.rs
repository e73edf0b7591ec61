#![doc = "popradius public API"]
mod common;
mod config;
mod count;
mod dataset;
mod error;
mod geom;
mod graph;
mod locate;
mod municipality;
mod pack;

pub mod landmark;
pub mod search;
pub mod tiling;

#[cfg(feature = "source")]
pub mod source;

#[doc(inline)]
pub use config::{BuildConfig, Config, GridSpec, SearchConfig};

#[doc(inline)]
pub use count::{CaseRow, Measure, TargetCount};

#[doc(inline)]
pub use dataset::{build_dataset, build_dataset_dir, Dataset, DatasetSources};

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use geom::{apportion, circle, clip, repair, Geometries, Piece};

#[doc(inline)]
pub use landmark::Landmark;

#[doc(inline)]
pub use locate::{parse_point, Location, UnitSummary};

#[doc(inline)]
pub use municipality::{Municipality, MunicipalityLocator, NearestOnly, NearestThenRandom, SelectionPolicy};

#[doc(inline)]
pub use pack::{
    current_snapshot, prune_snapshots, validate_dataset, BlobSink, BlobSource, DiskStore, FileHash, Manifest, MemStore,
};

#[doc(inline)]
pub use search::SearchResult;
