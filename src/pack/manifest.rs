use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GridSpec;
use crate::pack::{BlobSink, BlobSource};

pub(crate) const MANIFEST_KEY: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub sha256: String,
}

impl FileHash {
    pub(crate) fn of(bytes: &[u8]) -> Self {
        Self { sha256: hex::encode(Sha256::digest(bytes)) }
    }
}

/// Description of a built dataset: grid shapes, record counts and a hash per blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub crs: String,
    pub grids: BTreeMap<String, GridSpec>,
    pub counts: BTreeMap<String, usize>,
    pub files: BTreeMap<String, FileHash>,
}

impl Manifest {
    pub(crate) fn new(crs: &str) -> Self {
        Self {
            version: "1".into(),
            crs: crs.into(),
            grids: BTreeMap::new(),
            counts: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    /// Read manifest from a BlobSource
    pub fn from_source(src: &dyn BlobSource) -> Result<Self> {
        let bytes = src.get(MANIFEST_KEY)
            .context("Failed to read manifest.json")?;
        serde_json::from_slice(&bytes)
            .context("Failed to parse manifest.json")
    }

    pub(crate) fn write(&self, sink: &mut dyn BlobSink) -> Result<()> {
        sink.put(MANIFEST_KEY, &serde_json::to_vec_pretty(self)?)
    }
}

/// A sink that records the sha256 of every blob written through it.
pub(crate) struct HashingSink<'a> {
    inner: &'a mut dyn BlobSink,
    pub(crate) files: BTreeMap<String, FileHash>,
}

impl<'a> HashingSink<'a> {
    pub(crate) fn new(inner: &'a mut dyn BlobSink) -> Self {
        Self { inner, files: BTreeMap::new() }
    }
}

impl BlobSink for HashingSink<'_> {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.inner.put(key, bytes)?;
        self.files.insert(key.to_string(), FileHash::of(bytes));
        Ok(())
    }
}

/// Re-hash every blob listed in the manifest and compare.
pub fn validate_dataset(src: &dyn BlobSource) -> Result<Manifest> {
    let manifest = Manifest::from_source(src)?;

    for (key, expected) in &manifest.files {
        let bytes = src.get(key)
            .with_context(|| format!("Manifest lists missing blob {key}"))?;
        let actual = FileHash::of(&bytes);
        if &actual != expected {
            bail!("Hash mismatch for {key}: expected {}, got {}", expected.sha256, actual.sha256);
        }
    }

    log::info!("validated {} blobs", manifest.files.len());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::MemStore;

    fn build_store() -> MemStore {
        let mut store = MemStore::new();
        let mut manifest = Manifest::new("EPSG:4674");
        {
            let mut sink = HashingSink::new(&mut store);
            sink.put("a.bin", b"alpha").unwrap();
            sink.put("b/c.bin", b"beta").unwrap();
            manifest.files = std::mem::take(&mut sink.files);
        }
        manifest.grids.insert("tracts".into(), GridSpec::new(2, 3));
        manifest.write(&mut store).unwrap();
        store
    }

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            FileHash::of(b"abc").sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn untouched_dataset_validates() {
        let store = build_store();
        let manifest = validate_dataset(&store).unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.grids["tracts"], GridSpec::new(2, 3));
    }

    #[test]
    fn tampered_blob_fails_validation() {
        let mut store = build_store();
        store.put("a.bin", b"ALPHA").unwrap();
        let err = validate_dataset(&store).unwrap_err();
        assert!(err.to_string().contains("Hash mismatch for a.bin"));
    }
}
