//! The cache subsystem facade.
//!
//! [`MediaCache`] owns the process-scoped cache state (file index,
//! submission index, per-key write coordination) as explicit injected
//! structures with a defined initialization ([`MediaCache::open`]) and
//! teardown ([`MediaCache::save_index`] at shutdown). Workers and the
//! UI share one instance behind an `Arc`; every operation here is safe
//! to call from any thread, and the ones that touch disk are expected
//! to be called from worker contexts, never the UI thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::coordinator::{CacheWriteCoordinator, CommitOutcome};
use crate::error::CacheResult;
use crate::index::FileCacheIndex;
use crate::maintenance::{self, RepairReport};
use crate::metadata::{MetadataStore, MetadataUpdate, PostMetadata};
use crate::resolver::PathResolver;

/// Counters reported by the maintenance CLI's `stats` command.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    /// Number of cached media files.
    pub media_files: usize,
    /// Total size of cached media in bytes.
    pub media_bytes: u64,
    /// Number of posts in the submission index.
    pub indexed_posts: usize,
}

/// Disk-backed media and metadata cache for one cache root.
#[derive(Debug)]
pub struct MediaCache {
    resolver: Arc<PathResolver>,
    files: Arc<FileCacheIndex>,
    store: Arc<MetadataStore>,
    coordinator: CacheWriteCoordinator,
}

impl MediaCache {
    /// Assemble the cache structures without touching disk.
    ///
    /// `exists` answers and metadata reads are untrustworthy until
    /// [`MediaCache::preload`] and [`MediaCache::load_index`] have run;
    /// prefer [`MediaCache::open`] which does both.
    #[must_use]
    pub fn new(cache_root: &Path) -> Self {
        let resolver = Arc::new(PathResolver::new(cache_root));
        let files = Arc::new(FileCacheIndex::new());
        let store = Arc::new(MetadataStore::new(Arc::clone(&resolver)));
        let coordinator = CacheWriteCoordinator::new(
            Arc::clone(&resolver),
            Arc::clone(&files),
            Arc::clone(&store),
        );
        Self {
            resolver,
            files,
            store,
            coordinator,
        }
    }

    /// Startup routine: assemble, preload the file index, load the
    /// submission index.
    ///
    /// Mirrors application startup order; run `repair` afterwards when
    /// a consistency pass is wanted before serving reads.
    pub fn open(cache_root: &Path, shutdown: Option<&AtomicBool>) -> CacheResult<Self> {
        let cache = Self::new(cache_root);
        cache.preload(shutdown)?;
        cache.load_index()?;
        Ok(cache)
    }

    /// The resolver mapping URLs and post IDs to paths.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Deterministically compute the cached file path for a media URL.
    ///
    /// # Errors
    ///
    /// [`crate::error::CacheError::InvalidUrl`] for URLs without a
    /// derivable domain and identifier.
    pub fn resolve(&self, url: &str) -> CacheResult<PathBuf> {
        self.resolver.resolve(url)
    }

    /// Whether a URL's media is already cached. Never touches disk.
    ///
    /// Unresolvable URLs are simply not cached.
    #[must_use]
    pub fn exists(&self, url: &str) -> bool {
        self.resolve(url)
            .map(|path| self.files.exists(&path))
            .unwrap_or(false)
    }

    /// Whether an already-resolved path is cached. Never touches disk.
    #[must_use]
    pub fn exists_path(&self, path: &Path) -> bool {
        self.files.exists(path)
    }

    /// Scan the media subtree and (re)build the file index.
    pub fn preload(&self, shutdown: Option<&AtomicBool>) -> CacheResult<usize> {
        self.files.preload(self.resolver.media_root(), shutdown)
    }

    /// Load the on-disk submission index, degrading on corruption.
    pub fn load_index(&self) -> CacheResult<usize> {
        self.store.load_index()
    }

    /// Persist the submission index (snapshot-then-serialize).
    pub fn save_index(&self) -> CacheResult<()> {
        self.store.save_index()
    }

    /// Atomically commit downloaded bytes for a post's media URL.
    ///
    /// See [`CacheWriteCoordinator::commit_download`].
    pub fn commit_download(
        &self,
        url: &str,
        bytes: &[u8],
        post_id: &str,
        update: MetadataUpdate,
    ) -> CacheResult<CommitOutcome> {
        self.coordinator.commit_download(url, bytes, post_id, update)
    }

    /// Read a post's cached metadata.
    ///
    /// # Errors
    ///
    /// [`crate::error::CacheError::NotFound`] when the post is not
    /// cached; callers treat this as a miss, not a failure.
    pub fn read(&self, post_id: &str) -> CacheResult<PostMetadata> {
        self.store.read(post_id)
    }

    /// Create or merge a post's metadata record.
    ///
    /// See [`MetadataStore::write`] for the merge semantics.
    pub fn write(&self, post_id: &str, update: MetadataUpdate) -> CacheResult<PostMetadata> {
        self.store.write(post_id, update)
    }

    /// Reconcile disk contents against both indexes.
    ///
    /// Destructive maintenance: run with no downloads in flight.
    pub fn repair(&self, shutdown: Option<&AtomicBool>) -> CacheResult<RepairReport> {
        maintenance::repair_index(&self.resolver, &self.files, &self.store, shutdown)
    }

    /// Delete all metadata, keep media. No downloads in flight.
    pub fn clear_metadata(&self) -> CacheResult<()> {
        maintenance::clear_metadata(&self.resolver, &self.store)
    }

    /// Delete metadata and media. No downloads in flight.
    pub fn clear_full(&self) -> CacheResult<()> {
        maintenance::clear_full(&self.resolver, &self.files, &self.store)
    }

    /// Current cache counters. Sizes come from a stat of each indexed
    /// file, so this is CLI material, not a hot path.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let snapshot = self.files.snapshot();
        let media_bytes = snapshot
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|m| m.len())
            .sum();
        CacheStats {
            media_files: snapshot.len(),
            media_bytes,
            indexed_posts: self.store.index_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ModerationStatus;

    #[test]
    fn open_on_empty_root_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::open(dir.path(), None).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.media_files, 0);
        assert_eq!(stats.indexed_posts, 0);
    }

    #[test]
    fn exists_reflects_commit_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::open(dir.path(), None).unwrap();
        let url = "https://i.redd.it/pic.jpg";

        assert!(!cache.exists(url));
        cache
            .commit_download(url, b"bytes", "abc123", MetadataUpdate::new())
            .unwrap();
        assert!(cache.exists(url));
        assert!(!cache.exists("totally-invalid"));
    }

    #[test]
    fn reopen_sees_previous_commits() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://i.redd.it/pic.jpg";
        {
            let cache = MediaCache::open(dir.path(), None).unwrap();
            cache
                .commit_download(
                    url,
                    b"bytes",
                    "abc123",
                    MetadataUpdate::new().with_moderation(ModerationStatus::Approved),
                )
                .unwrap();
            cache.save_index().unwrap();
        }

        let cache = MediaCache::open(dir.path(), None).unwrap();
        assert!(cache.exists(url));
        let record = cache.read("abc123").unwrap();
        assert_eq!(record.moderation, ModerationStatus::Approved);
    }

    #[test]
    fn stats_count_files_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::open(dir.path(), None).unwrap();
        cache
            .commit_download(
                "https://i.redd.it/pic.jpg",
                b"12345",
                "abc123",
                MetadataUpdate::new(),
            )
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.media_files, 1);
        assert_eq!(stats.media_bytes, 5);
        assert_eq!(stats.indexed_posts, 1);
    }
}
