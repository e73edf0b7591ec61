mod codec;
mod manifest;
mod publish;
mod source;

pub(crate) use codec::{point_xy, read_records, wkb_hex, write_records};
pub(crate) use manifest::HashingSink;
pub use manifest::{validate_dataset, FileHash, Manifest};
pub use publish::{current_snapshot, prune_snapshots, publish, staging_dir};
pub use source::{BlobSink, BlobSource, DiskStore, MemStore};
