use std::{collections::HashMap, path::{Component, Path, PathBuf}, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};

/// Read-only access to dataset blobs by relative key, e.g.
/// "tracts/index.json", "tracts/cells/cell-42.bin", "count.json".
pub trait BlobSource: Send + Sync {
    fn get(&self, key: &str) -> Result<Arc<[u8]>>;
    fn has(&self, key: &str) -> bool;
}

/// Write access to dataset blobs by relative key.
pub trait BlobSink {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Blobs stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    #[inline] pub fn root(&self) -> &Path { &self.root }

    fn full(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            bail!("invalid blob key: {key:?}");
        }
        Ok(self.root.join(rel))
    }
}

impl BlobSource for DiskStore {
    fn get(&self, key: &str) -> Result<Arc<[u8]>> {
        let path = self.full(key)?;
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read blob {}", path.display()))?;
        Ok(Arc::from(bytes))
    }

    fn has(&self, key: &str) -> bool {
        self.full(key).map(|path| path.is_file()).unwrap_or(false)
    }
}

impl BlobSink for DiskStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.full(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write blob {}", path.display()))?;
        Ok(())
    }
}

/// Blobs held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    pub(crate) blobs: HashMap<String, Arc<[u8]>>,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    #[inline] pub fn len(&self) -> usize { self.blobs.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.blobs.is_empty() }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = self.blobs.keys().map(String::as_str).collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }
}

impl BlobSource for MemStore {
    fn get(&self, key: &str) -> Result<Arc<[u8]>> {
        self.blobs.get(key).cloned()
            .ok_or_else(|| anyhow!("missing blob: {key}"))
    }

    fn has(&self, key: &str) -> bool { self.blobs.contains_key(key) }
}

impl BlobSink for MemStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(key.to_string(), Arc::from(bytes.to_vec()));
        Ok(())
    }
}

impl<S: BlobSource + ?Sized> BlobSource for Arc<S> {
    fn get(&self, key: &str) -> Result<Arc<[u8]>> { (**self).get(key) }
    fn has(&self, key: &str) -> bool { (**self).has(key) }
}
