//! In-memory index of cached media files.
//!
//! The UI thread asks "is this URL already cached?" once per visible
//! thumbnail, so the answer must never touch disk. [`FileCacheIndex`]
//! holds the set of known cached paths behind an `RwLock`: reads are
//! O(1) and shared, writes go through the coordinator.
//!
//! The set must be exact, not a conservative superset: a stale entry
//! makes the UI show a thumbnail for a file that is gone, and a missing
//! entry re-downloads something already on disk. [`FileCacheIndex::preload`]
//! establishes exactness at startup; repair re-establishes it after
//! drift (crashes, files deleted out from under the app).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use walkdir::WalkDir;

use crate::error::{CacheError, CacheResult};

/// Thread-safe set of all known cached media file paths.
#[derive(Debug, Default)]
pub struct FileCacheIndex {
    paths: RwLock<HashSet<PathBuf>>,
}

impl FileCacheIndex {
    /// Create an empty index. Untrustworthy until [`preload`] has run.
    ///
    /// [`preload`]: FileCacheIndex::preload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the media subtree and replace the index contents wholesale.
    ///
    /// Runs to completion before any `exists` answer is trusted. Walk
    /// errors on individual entries (permission, racing deletes) are
    /// logged and skipped; the scan continues.
    ///
    /// Returns the number of files indexed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Interrupted`] if the shutdown flag is set
    /// mid-scan; the previous index contents are kept in that case.
    pub fn preload(
        &self,
        media_root: &Path,
        shutdown: Option<&AtomicBool>,
    ) -> CacheResult<usize> {
        let mut found = HashSet::new();

        if media_root.is_dir() {
            for entry in WalkDir::new(media_root) {
                if let Some(flag) = shutdown {
                    if flag.load(Ordering::SeqCst) {
                        log::warn!("Preload interrupted, keeping previous file index");
                        return Err(CacheError::Interrupted);
                    }
                }
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        found.insert(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Skipping unreadable cache entry: {}", e);
                    }
                }
            }
        } else {
            log::debug!(
                "Media root {} does not exist yet, starting empty",
                media_root.display()
            );
        }

        let count = found.len();
        let mut paths = self.paths.write().expect("file index lock poisoned");
        *paths = found;
        log::info!("Preloaded file cache index with {} entries", count);
        Ok(count)
    }

    /// O(1) membership check against the in-memory set. Never touches disk.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.paths
            .read()
            .expect("file index lock poisoned")
            .contains(path)
    }

    /// Record a path after its file is confirmed written to disk.
    ///
    /// Safe to call from any worker; the write lock serializes callers.
    pub fn register(&self, path: PathBuf) {
        self.paths
            .write()
            .expect("file index lock poisoned")
            .insert(path);
    }

    /// Drop a path from the index. Returns whether it was present.
    ///
    /// Used by repair when a file turns out to be missing on disk.
    pub fn unregister(&self, path: &Path) -> bool {
        self.paths
            .write()
            .expect("file index lock poisoned")
            .remove(path)
    }

    /// Number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.read().expect("file index lock poisoned").len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the index (cache clear).
    pub fn reset(&self) {
        self.paths.write().expect("file index lock poisoned").clear();
    }

    /// Point-in-time copy of the indexed paths.
    ///
    /// Callers that need to iterate (repair, stats) take a snapshot so
    /// concurrent registrations never invalidate the traversal.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.paths
            .read()
            .expect("file index lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn preload_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        fs::create_dir_all(media.join("i.redd.it")).unwrap();
        fs::create_dir_all(media.join("i.imgur.com")).unwrap();
        fs::write(media.join("i.redd.it/a.jpg"), b"a").unwrap();
        fs::write(media.join("i.imgur.com/b.mp4"), b"b").unwrap();

        let index = FileCacheIndex::new();
        let count = index.preload(&media, None).unwrap();
        assert_eq!(count, 2);
        assert!(index.exists(&media.join("i.redd.it/a.jpg")));
        assert!(index.exists(&media.join("i.imgur.com/b.mp4")));
        assert!(!index.exists(&media.join("i.redd.it/missing.jpg")));
    }

    #[test]
    fn preload_of_missing_root_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileCacheIndex::new();
        let count = index.preload(&dir.path().join("media"), None).unwrap();
        assert_eq!(count, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn preload_replaces_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        fs::create_dir_all(&media).unwrap();

        let index = FileCacheIndex::new();
        index.register(media.join("ghost.jpg"));
        index.preload(&media, None).unwrap();
        assert!(!index.exists(&media.join("ghost.jpg")));
    }

    #[test]
    fn interrupted_preload_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("a.jpg"), b"a").unwrap();

        let index = FileCacheIndex::new();
        index.register(PathBuf::from("/previous/entry.jpg"));

        let flag = AtomicBool::new(true);
        let result = index.preload(&media, Some(&flag));
        assert!(matches!(result, Err(CacheError::Interrupted)));
        assert!(index.exists(Path::new("/previous/entry.jpg")));
    }

    #[test]
    fn register_and_unregister_round_trip() {
        let index = FileCacheIndex::new();
        let path = PathBuf::from("/cache/media/i.redd.it/x.png");
        index.register(path.clone());
        assert!(index.exists(&path));
        assert!(index.unregister(&path));
        assert!(!index.exists(&path));
        assert!(!index.unregister(&path));
    }

    #[test]
    fn snapshot_is_detached_from_live_set() {
        let index = FileCacheIndex::new();
        index.register(PathBuf::from("/a"));
        let snap = index.snapshot();
        index.register(PathBuf::from("/b"));
        assert_eq!(snap.len(), 1);
        assert_eq!(index.len(), 2);
    }
}
