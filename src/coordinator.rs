//! Atomic commit of downloaded media into the cache.
//!
//! A completed download touches three things: the file on disk, the
//! in-memory file index, and the post's metadata record. The
//! coordinator wraps that compound mutation so observers see it fully
//! done or not-yet-done, never a file that exists but is unindexed (or
//! the reverse).
//!
//! Writes for distinct cache keys proceed in parallel; writes for the
//! same key are serialized by a per-key mutex, so the second worker
//! racing on a key finds the first worker's completed file and skips
//! the redundant write instead of corrupting it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::CacheResult;
use crate::index::FileCacheIndex;
use crate::metadata::store::write_atomically;
use crate::metadata::{MetadataStore, MetadataUpdate, PostMetadata};
use crate::resolver::PathResolver;

/// Serializes concurrent cache mutations from background workers.
#[derive(Debug)]
pub struct CacheWriteCoordinator {
    resolver: Arc<PathResolver>,
    files: Arc<FileCacheIndex>,
    store: Arc<MetadataStore>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Outcome of a successful commit.
#[derive(Debug)]
pub struct CommitOutcome {
    /// Absolute path of the cached media file.
    pub path: PathBuf,
    /// Merged metadata record after the commit.
    pub record: PostMetadata,
    /// Whether this call wrote the file (false: another worker already
    /// committed the same key and only metadata was merged).
    pub wrote_file: bool,
}

impl CacheWriteCoordinator {
    /// Create a coordinator over the shared cache structures.
    #[must_use]
    pub fn new(
        resolver: Arc<PathResolver>,
        files: Arc<FileCacheIndex>,
        store: Arc<MetadataStore>,
    ) -> Self {
        Self {
            resolver,
            files,
            store,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Commit downloaded bytes for a post's media URL.
    ///
    /// Under the key's critical section: write the bytes to a temporary
    /// sibling, rename into place, register the path in the file index,
    /// then merge the metadata record (media path appended, supplied
    /// fields applied). If the key is already committed, the file write
    /// is skipped and only metadata merges.
    ///
    /// # Errors
    ///
    /// [`crate::error::CacheError::InvalidUrl`] when no cache key can be
    /// derived (skip the item), [`crate::error::CacheError::WriteFailed`]
    /// when the disk write or rename fails. On failure neither the file
    /// index nor the metadata record is updated; a metadata failure
    /// after the file landed rolls the file back out.
    pub fn commit_download(
        &self,
        url: &str,
        bytes: &[u8],
        post_id: &str,
        update: MetadataUpdate,
    ) -> CacheResult<CommitOutcome> {
        let key = self.resolver.cache_key(url)?;
        let relative = key.relative();
        let path = self.resolver.media_path(&key);

        let lock = self.lock_for(&relative);
        let result = {
            let _guard = lock.lock().expect("cache key lock poisoned");
            self.commit_locked(path, bytes, post_id, update, &relative)
        };
        self.release(&relative, lock);
        result
    }

    /// Body of [`CacheWriteCoordinator::commit_download`], run inside the
    /// key's critical section.
    fn commit_locked(
        &self,
        path: PathBuf,
        bytes: &[u8],
        post_id: &str,
        update: MetadataUpdate,
        relative: &str,
    ) -> CacheResult<CommitOutcome> {
        let mut wrote_file = false;
        if self.files.exists(&path) {
            log::debug!("Key {} already committed, merging metadata only", relative);
        } else {
            write_atomically(&path, bytes)?;
            self.files.register(path.clone());
            wrote_file = true;
            log::debug!("Committed {} ({} bytes)", path.display(), bytes.len());
        }

        match self
            .store
            .write(post_id, update.with_media_path(relative.to_string()))
        {
            Ok(record) => Ok(CommitOutcome {
                path,
                record,
                wrote_file,
            }),
            Err(e) => {
                // Metadata is half the commit; without it the file must
                // not stay observable either.
                if wrote_file {
                    self.files.unregister(&path);
                    let _ = fs::remove_file(&path);
                }
                Err(e)
            }
        }
    }

    /// Get (or create) the mutex guarding one cache key.
    fn lock_for(&self, relative: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().expect("key lock table poisoned");
        locks
            .entry(relative.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a key's lock entry once no other worker holds it, keeping
    /// the table bounded by in-flight keys rather than all keys ever.
    fn release(&self, relative: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().expect("key lock table poisoned");
        // Two strong refs mean table + us; nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(relative);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::metadata::ModerationStatus;
    use std::path::Path;

    fn coordinator(root: &Path) -> CacheWriteCoordinator {
        let resolver = Arc::new(PathResolver::new(root));
        let files = Arc::new(FileCacheIndex::new());
        let store = Arc::new(MetadataStore::new(Arc::clone(&resolver)));
        CacheWriteCoordinator::new(resolver, files, store)
    }

    #[test]
    fn commit_registers_file_and_metadata_together() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path());

        let outcome = coord
            .commit_download(
                "https://i.redd.it/pic.jpg",
                b"jpegbytes",
                "abc123",
                MetadataUpdate::new().with_moderation(ModerationStatus::Unmoderated),
            )
            .unwrap();

        assert!(outcome.wrote_file);
        assert!(outcome.path.is_file());
        assert!(coord.files.exists(&outcome.path));
        assert_eq!(
            outcome.record.media_paths,
            vec!["i.redd.it/pic.jpg".to_string()]
        );

        let read_back = coord.store.read("abc123").unwrap();
        assert_eq!(read_back.media_paths, outcome.record.media_paths);
    }

    #[test]
    fn second_commit_for_same_key_skips_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path());
        let url = "https://i.redd.it/pic.jpg";

        let first = coord
            .commit_download(url, b"original", "abc123", MetadataUpdate::new())
            .unwrap();
        let second = coord
            .commit_download(url, b"different bytes", "abc123", MetadataUpdate::new())
            .unwrap();

        assert!(first.wrote_file);
        assert!(!second.wrote_file);
        // First writer's bytes win; no double-write.
        assert_eq!(fs::read(&second.path).unwrap(), b"original");
        // Media path did not duplicate in the record.
        assert_eq!(second.record.media_paths.len(), 1);
    }

    #[test]
    fn invalid_url_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path());
        let result =
            coord.commit_download("definitely not a url", b"x", "abc123", MetadataUpdate::new());
        assert!(matches!(result, Err(CacheError::InvalidUrl(_))));
        assert!(coord.store.read("abc123").is_err());
        assert_eq!(coord.files.len(), 0);
    }

    #[test]
    fn failed_write_leaves_no_registered_entry() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the media subtree should be makes every
        // directory creation under it fail.
        fs::write(dir.path().join("media"), b"squatter").unwrap();

        let coord = coordinator(dir.path());
        let result = coord.commit_download(
            "https://i.redd.it/pic.jpg",
            b"bytes",
            "abc123",
            MetadataUpdate::new(),
        );

        assert!(matches!(result, Err(CacheError::WriteFailed { .. })));
        assert_eq!(coord.files.len(), 0);
        assert!(coord.store.read("abc123").is_err());
    }

    #[test]
    fn gallery_posts_accumulate_media_paths() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path());

        coord
            .commit_download("https://i.redd.it/one.jpg", b"1", "gal111", MetadataUpdate::new())
            .unwrap();
        coord
            .commit_download("https://i.redd.it/two.jpg", b"2", "gal111", MetadataUpdate::new())
            .unwrap();

        let record = coord.store.read("gal111").unwrap();
        assert_eq!(
            record.media_paths,
            vec![
                "i.redd.it/one.jpg".to_string(),
                "i.redd.it/two.jpg".to_string()
            ]
        );
    }

    #[test]
    fn lock_table_does_not_grow_unbounded() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path());
        for i in 0..20 {
            coord
                .commit_download(
                    &format!("https://i.redd.it/pic{i}.jpg"),
                    b"x",
                    "abc123",
                    MetadataUpdate::new(),
                )
                .unwrap();
        }
        assert!(coord.key_locks.lock().unwrap().is_empty());
    }
}
