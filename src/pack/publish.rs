//! Versioned publication of dataset directories.
//!
//! Each build lands in its own snapshot directory under the dataset root and
//! goes live when the `CURRENT` pointer file is atomically replaced:
//!
//! ```text
//! dataset/CURRENT      "v0002"
//! dataset/v0001/       previous snapshot, still readable by open handles
//! dataset/v0002/       live snapshot
//! ```
//!
//! Publishing never deletes a snapshot. Old ones go away only through
//! `prune_snapshots`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use tempfile::TempDir;

use crate::common::{ensure_dir_exists, write_atomic};

const CURRENT_KEY: &str = "CURRENT";

fn snapshot_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) { return None }
    digits.parse().ok()
}

/// Snapshot directories under `root` with their numbers, oldest first.
fn snapshots(root: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !root.exists() { return Ok(Vec::new()) }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(root).with_context(|| format!("Failed to list {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() { continue }
        if let Some(number) = entry.file_name().to_str().and_then(snapshot_number) {
            found.push((number, entry.path()));
        }
    }
    found.sort_unstable_by_key(|(number, _)| *number);
    Ok(found)
}

/// Create an empty staging directory inside the dataset root, on the same
/// filesystem as the snapshots, so `publish` can move it with a rename.
pub fn staging_dir(root: &Path) -> Result<TempDir> {
    ensure_dir_exists(root)?;
    tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(root)
        .with_context(|| format!("Failed to create staging directory in {}", root.display()))
}

/// The live snapshot directory of the dataset at `root`.
pub fn current_snapshot(root: &Path) -> Result<PathBuf> {
    let pointer = root.join(CURRENT_KEY);
    let name = std::fs::read_to_string(&pointer)
        .with_context(|| format!("No published dataset at {} (missing {CURRENT_KEY})", root.display()))?;
    let name = name.trim();
    if snapshot_number(name).is_none() {
        anyhow::bail!("{} names an invalid snapshot {name:?}", pointer.display());
    }
    let snapshot = root.join(name);
    if !snapshot.is_dir() {
        anyhow::bail!("{} points at missing snapshot {}", pointer.display(), snapshot.display());
    }
    Ok(snapshot)
}

/// Move the fully written `staging` directory to a new snapshot and point
/// `CURRENT` at it. Readers resolve either the old snapshot or the new one.
pub fn publish(staging: TempDir, root: &Path) -> Result<PathBuf> {
    let next = snapshots(root)?.last().map_or(1, |(number, _)| number + 1);
    let name = format!("v{next:04}");
    let snapshot = root.join(&name);

    let staged = staging.keep();
    if let Err(err) = std::fs::rename(&staged, &snapshot) {
        if let Err(cleanup) = std::fs::remove_dir_all(&staged) {
            warn!("[publish] could not remove staging directory {}: {cleanup}", staged.display());
        }
        return Err(err).with_context(|| format!("Failed to move staged dataset to {}", snapshot.display()));
    }

    if let Err(err) = write_atomic(&root.join(CURRENT_KEY), name.as_bytes()) {
        // the pointer still names the previous snapshot
        return Err(match std::fs::remove_dir_all(&snapshot) {
            Ok(()) => err.context(format!("Failed to publish {}", snapshot.display())),
            Err(cleanup) => err.context(format!(
                "Failed to publish {}, and the unpublished snapshot could not be removed: {cleanup}",
                snapshot.display()
            )),
        });
    }

    info!("[publish] {} now serves {name}", root.display());
    Ok(snapshot)
}

/// Delete all but the newest `keep` snapshots. The live snapshot is always
/// kept. Handles still reading a removed snapshot will fail, so callers
/// choose when this is safe.
pub fn prune_snapshots(root: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let current = current_snapshot(root)?;
    let all = snapshots(root)?;
    let stale = all.len().saturating_sub(keep);

    let mut removed = Vec::new();
    for (_, path) in all.into_iter().take(stale) {
        if path == current { continue }
        std::fs::remove_dir_all(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        removed.push(path);
    }
    if !removed.is_empty() {
        info!("[publish] pruned {} old snapshots from {}", removed.len(), root.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(root: &Path, file: &str) -> TempDir {
        let staging = staging_dir(root).unwrap();
        std::fs::write(staging.path().join(file), file.as_bytes()).unwrap();
        staging
    }

    #[test]
    fn publish_creates_missing_dataset() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("fresh");

        let snapshot = publish(stage(&live, "manifest.json"), &live).unwrap();
        assert_eq!(snapshot, live.join("v0001"));
        assert_eq!(current_snapshot(&live).unwrap(), snapshot);
        assert!(snapshot.join("manifest.json").is_file());
    }

    #[test]
    fn publish_switches_the_pointer_and_keeps_the_old_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("dataset");

        let old = publish(stage(&live, "old.txt"), &live).unwrap();
        let pinned = current_snapshot(&live).unwrap();
        let new = publish(stage(&live, "new.txt"), &live).unwrap();

        assert_eq!(current_snapshot(&live).unwrap(), new);
        assert!(new.join("new.txt").is_file());
        assert!(!new.join("old.txt").exists());

        // a reader that resolved the pointer earlier still sees its files
        assert_eq!(pinned, old);
        assert_eq!(std::fs::read(pinned.join("old.txt")).unwrap(), b"old.txt");

        // no staging leftovers: CURRENT plus two snapshots
        assert_eq!(std::fs::read_dir(&live).unwrap().count(), 3);
    }

    #[test]
    fn missing_or_bad_pointers_are_errors() {
        let root = tempfile::tempdir().unwrap();
        assert!(current_snapshot(root.path()).is_err());

        std::fs::write(root.path().join(CURRENT_KEY), b"../elsewhere").unwrap();
        assert!(current_snapshot(root.path()).is_err());

        std::fs::write(root.path().join(CURRENT_KEY), b"v0007").unwrap();
        assert!(current_snapshot(root.path()).is_err());
    }

    #[test]
    fn pruning_keeps_the_newest_and_the_live_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("dataset");
        for file in ["a", "b", "c"] {
            publish(stage(&live, file), &live).unwrap();
        }

        let removed = prune_snapshots(&live, 1).unwrap();
        assert_eq!(removed, vec![live.join("v0001"), live.join("v0002")]);
        assert!(current_snapshot(&live).unwrap().join("c").is_file());

        let next = publish(stage(&live, "d"), &live).unwrap();
        assert_eq!(next, live.join("v0004"));
    }
}
