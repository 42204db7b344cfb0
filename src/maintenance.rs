//! Repair and bulk-deletion maintenance for the cache.
//!
//! Exactness of the indexes can drift after crashes or when files are
//! deleted out from under the app. [`repair_index`] reconciles on-disk
//! state with the submission index and the file index; the clear
//! functions are the destructive bulk deletes behind the maintenance
//! CLI. All of these assume no downloads are in flight; callers drain
//! background workers first.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{CacheError, CacheResult};
use crate::index::FileCacheIndex;
use crate::metadata::store::write_atomically;
use crate::metadata::{MetadataStore, PostMetadata};
use crate::resolver::{PathResolver, INDEX_FILE};

/// Counts of what a repair pass did.
///
/// A clean cache repairs to `added == 0 && removed == 0`; repair is
/// idempotent, so a second pass right after a first is always clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Index entries added (records discovered on disk or synthesized
    /// for orphaned media files).
    pub added: usize,
    /// Stale entries removed (index entries without a record, media
    /// references without a file).
    pub removed: usize,
    /// Index entries verified and left alone.
    pub unchanged: usize,
}

impl RepairReport {
    /// Whether the pass found nothing to fix.
    ///
    /// `unchanged` counts verified entries and is nonzero on any
    /// non-empty cache; callers checking for a clean pass must use this
    /// predicate, not all-zero counts.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    /// JSON form of the report with the clean condition made explicit,
    /// for scripted consumers of `repair --json`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "added": self.added,
            "removed": self.removed,
            "unchanged": self.unchanged,
            "clean": self.is_clean(),
        })
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} unchanged",
            self.added, self.removed, self.unchanged
        )
    }
}

/// Reconcile disk contents against the submission and file indexes.
///
/// The pass walks both subtrees and fixes drift in both directions:
///
/// * media files referenced by no metadata record get a minimal
///   synthesized record (counted as `added`),
/// * media references whose file is gone are pruned from their records
///   (counted as `removed`),
/// * index entries whose record file is gone are dropped, records
///   missing from the index are picked up,
/// * the in-memory file index is rebuilt wholesale, and the repaired
///   submission index is persisted.
///
/// # Errors
///
/// [`CacheError::Interrupted`] when the shutdown flag fires mid-pass
/// (in-memory state may already reflect partial repair; re-run to
/// finish), or I/O errors from unwritable metadata.
pub fn repair_index(
    resolver: &PathResolver,
    files: &FileCacheIndex,
    store: &MetadataStore,
    shutdown: Option<&AtomicBool>,
) -> CacheResult<RepairReport> {
    let mut report = RepairReport::default();

    // Exact picture of the media subtree.
    files.preload(resolver.media_root(), shutdown)?;
    let media_relative: HashSet<String> = files
        .snapshot()
        .iter()
        .filter_map(|path| resolver.relative_media(path))
        .collect();

    check_shutdown(shutdown)?;

    // Scan metadata records; collect the rebuilt index and every media
    // reference, pruning references whose file is gone.
    let mut disk_index: HashMap<String, String> = HashMap::new();
    let mut referenced: HashSet<String> = HashSet::new();

    let metadata_root = resolver.metadata_root();
    if metadata_root.is_dir() {
        for entry in WalkDir::new(metadata_root) {
            check_shutdown(shutdown)?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable metadata entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.file_name().is_some_and(|n| n == INDEX_FILE)
                || path.extension().is_some_and(|e| e == "part")
            {
                continue;
            }

            let Some(mut record) = read_record_tolerant(path) else {
                continue;
            };
            let Ok(relative) = resolver.metadata_relative(&record.id) else {
                log::warn!("Record {} has invalid post id, skipping", path.display());
                continue;
            };

            // The record's location must be the pure function of its ID;
            // a misplaced record (wrong shard, renamed file) would leave
            // the index pointing at a path no read will ever compute.
            let canonical = resolver.metadata_path(&record.id)?;
            let mut record_path = path.to_path_buf();
            if record_path != canonical {
                if canonical.is_file() {
                    log::warn!(
                        "Record {} duplicates canonical {}, leaving it unindexed",
                        record_path.display(),
                        canonical.display()
                    );
                    continue;
                }
                if let Some(parent) = canonical.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&record_path, &canonical)?;
                log::info!(
                    "Relocated misplaced record {} to {}",
                    record_path.display(),
                    canonical.display()
                );
                record_path = canonical;
            }

            let before = record.media_paths.len();
            record.media_paths.retain(|rel| media_relative.contains(rel));
            let pruned = before - record.media_paths.len();
            if pruned > 0 {
                log::debug!(
                    "Pruned {} missing media reference(s) from {}",
                    pruned,
                    record.id
                );
                report.removed += pruned;
                let json = serde_json::to_string_pretty(&record)
                    .map_err(|e| CacheError::IndexCorrupt(e.to_string()))?;
                write_atomically(&record_path, json.as_bytes())?;
            }

            referenced.extend(record.media_paths.iter().cloned());
            disk_index.insert(record.id.clone(), relative);
        }
    }

    // Synthesize minimal records for orphaned media files.
    for relative in &media_relative {
        check_shutdown(shutdown)?;
        if referenced.contains(relative) {
            continue;
        }
        let post_id = orphan_post_id(relative);
        if disk_index.contains_key(&post_id) {
            continue;
        }
        let mut record = PostMetadata::new(&post_id);
        record.media_paths.push(relative.clone());
        let path = resolver.metadata_path(&post_id)?;
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| CacheError::IndexCorrupt(e.to_string()))?;
        write_atomically(&path, json.as_bytes())?;
        disk_index.insert(post_id.clone(), resolver.metadata_relative(&post_id)?);
        log::debug!("Synthesized metadata {} for orphan {}", post_id, relative);
    }

    // Diff the rebuilt index against the live one for the report, then
    // swap it in and persist.
    let current = store.index_snapshot();
    for (post_id, relative) in &current {
        match disk_index.get(post_id) {
            Some(found) if found == relative => report.unchanged += 1,
            Some(_) => {
                // Entry survives but pointed at the wrong path.
                report.removed += 1;
                report.added += 1;
            }
            None => {
                log::debug!("Dropping stale index entry for {}", post_id);
                report.removed += 1;
            }
        }
    }
    report.added += disk_index
        .keys()
        .filter(|id| !current.contains_key(*id))
        .count();

    store.replace_index(disk_index);
    store.save_index()?;

    log::info!("Repair complete: {}", report);
    Ok(report)
}

/// Delete all metadata files and reset the submission index to empty.
/// Media files are untouched.
pub fn clear_metadata(resolver: &PathResolver, store: &MetadataStore) -> CacheResult<()> {
    remove_tree(resolver.metadata_root())?;
    store.reset();
    log::info!("Cleared metadata cache");
    Ok(())
}

/// Delete metadata and all media files; resets both in-memory indexes.
pub fn clear_full(
    resolver: &PathResolver,
    files: &FileCacheIndex,
    store: &MetadataStore,
) -> CacheResult<()> {
    clear_metadata(resolver, store)?;
    remove_tree(resolver.media_root())?;
    files.reset();
    log::info!("Cleared media cache");
    Ok(())
}

/// Remove a directory tree if it exists; missing is fine.
fn remove_tree(root: &Path) -> CacheResult<()> {
    match fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Io(e)),
    }
}

/// Deterministic post ID for a media file no record claims.
///
/// Keyed on the relative media path, so repeated repairs synthesize the
/// same record instead of piling up duplicates.
fn orphan_post_id(relative: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("orphan_{hex}")
}

fn check_shutdown(shutdown: Option<&AtomicBool>) -> CacheResult<()> {
    if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
        log::warn!("Repair interrupted");
        return Err(CacheError::Interrupted);
    }
    Ok(())
}

/// Parse one record file, tolerating (and skipping) corrupt content.
fn read_record_tolerant(path: &Path) -> Option<PostMetadata> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Skipping corrupt metadata record {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataUpdate;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        resolver: Arc<PathResolver>,
        files: Arc<FileCacheIndex>,
        store: Arc<MetadataStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(PathResolver::new(dir.path()));
        let files = Arc::new(FileCacheIndex::new());
        let store = Arc::new(MetadataStore::new(Arc::clone(&resolver)));
        Fixture {
            _dir: dir,
            resolver,
            files,
            store,
        }
    }

    fn put_media(f: &Fixture, relative: &str, bytes: &[u8]) {
        let path = f.resolver.media_path_from_relative(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn orphan_media_gets_a_synthesized_record() {
        let f = fixture();
        put_media(&f, "i.redd.it/orphan.jpg", b"x");

        let report = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 0);

        // The synthesized record is readable through the store.
        let snapshot = f.store.index_snapshot();
        let (post_id, _) = snapshot.iter().next().unwrap();
        let record = f.store.read(post_id).unwrap();
        assert_eq!(record.media_paths, vec!["i.redd.it/orphan.jpg".to_string()]);
    }

    #[test]
    fn missing_media_file_removes_stale_state() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");
        f.store
            .write(
                "abc123",
                MetadataUpdate::new().with_media_path("i.redd.it/pic.jpg"),
            )
            .unwrap();
        repair_index(&f.resolver, &f.files, &f.store, None).unwrap();

        // Delete the media file behind the cache's back.
        fs::remove_file(f.resolver.media_path_from_relative("i.redd.it/pic.jpg")).unwrap();

        let report = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert!(report.removed >= 1);
        assert!(!f
            .files
            .exists(&f.resolver.media_path_from_relative("i.redd.it/pic.jpg")));
        let record = f.store.read("abc123").unwrap();
        assert!(record.media_paths.is_empty());
    }

    #[test]
    fn misplaced_record_is_relocated_to_its_shard() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");

        // Record for abc123 sitting in the wrong shard directory.
        let wrong = f.resolver.metadata_root().join("zz").join("abc123.json");
        fs::create_dir_all(wrong.parent().unwrap()).unwrap();
        let mut record = PostMetadata::new("abc123");
        record.media_paths.push("i.redd.it/pic.jpg".to_string());
        fs::write(&wrong, serde_json::to_string_pretty(&record).unwrap()).unwrap();

        let report = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert!(report.added >= 1);

        // The file moved to its canonical location and the index entry
        // resolves to a readable record.
        assert!(!wrong.exists());
        assert!(f.resolver.metadata_path("abc123").unwrap().is_file());
        let read = f.store.read("abc123").unwrap();
        assert_eq!(read.media_paths, vec!["i.redd.it/pic.jpg".to_string()]);

        let second = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert!(second.is_clean());
    }

    #[test]
    fn misplaced_duplicate_of_canonical_record_is_left_unindexed() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");
        f.store
            .write(
                "abc123",
                MetadataUpdate::new().with_media_path("i.redd.it/pic.jpg"),
            )
            .unwrap();

        let stray = f.resolver.metadata_root().join("zz").join("abc123.json");
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(
            &stray,
            serde_json::to_string_pretty(&PostMetadata::new("abc123")).unwrap(),
        )
        .unwrap();

        repair_index(&f.resolver, &f.files, &f.store, None).unwrap();

        // The canonical record wins; the stray never shadows it.
        let read = f.store.read("abc123").unwrap();
        assert_eq!(read.media_paths, vec!["i.redd.it/pic.jpg".to_string()]);
    }

    #[test]
    fn report_json_carries_the_clean_flag() {
        let clean = RepairReport {
            added: 0,
            removed: 0,
            unchanged: 7,
        };
        assert_eq!(clean.to_json()["clean"], serde_json::json!(true));

        let dirty = RepairReport {
            added: 1,
            ..RepairReport::default()
        };
        assert_eq!(dirty.to_json()["clean"], serde_json::json!(false));
        assert_eq!(dirty.to_json()["added"], serde_json::json!(1));
    }

    #[test]
    fn stale_index_entry_without_record_is_dropped() {
        let f = fixture();
        f.store.insert_index_entry("ghost1", "gh/ghost1.json");

        let report = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(f.store.index_len(), 0);
    }

    #[test]
    fn repair_is_idempotent() {
        let f = fixture();
        put_media(&f, "i.redd.it/a.jpg", b"a");
        put_media(&f, "i.imgur.com/b.mp4", b"b");
        f.store
            .write(
                "abc123",
                MetadataUpdate::new().with_media_path("i.redd.it/a.jpg"),
            )
            .unwrap();

        let first = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert!(!first.is_clean());

        let second = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.removed, 0);
        assert!(second.is_clean());
    }

    #[test]
    fn repair_rebuilds_a_lost_index() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");
        f.store
            .write(
                "abc123",
                MetadataUpdate::new().with_media_path("i.redd.it/pic.jpg"),
            )
            .unwrap();
        f.store.save_index().unwrap();

        // Simulate a corrupt index discovered at startup.
        fs::write(f.resolver.index_path(), b"garbage").unwrap();
        f.store.load_index().unwrap();
        assert_eq!(f.store.index_len(), 0);

        let report = repair_index(&f.resolver, &f.files, &f.store, None).unwrap();
        assert_eq!(report.added, 1);
        assert!(f.store.read("abc123").is_ok());
    }

    #[test]
    fn clear_metadata_keeps_media() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");
        f.store.write("abc123", MetadataUpdate::new()).unwrap();
        f.store.save_index().unwrap();

        clear_metadata(&f.resolver, &f.store).unwrap();

        assert_eq!(f.store.index_len(), 0);
        assert!(!f.resolver.metadata_root().exists());
        assert!(f
            .resolver
            .media_path_from_relative("i.redd.it/pic.jpg")
            .is_file());
    }

    #[test]
    fn clear_full_empties_everything() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");
        f.files.preload(f.resolver.media_root(), None).unwrap();
        f.store.write("abc123", MetadataUpdate::new()).unwrap();

        clear_full(&f.resolver, &f.files, &f.store).unwrap();

        assert!(f.files.is_empty());
        assert_eq!(f.store.index_len(), 0);
        assert!(!f.resolver.media_root().exists());
        assert!(!f.resolver.metadata_root().exists());

        // A fresh preload over the cleared tree stays empty.
        assert_eq!(f.files.preload(f.resolver.media_root(), None).unwrap(), 0);
    }

    #[test]
    fn shutdown_flag_interrupts_repair() {
        let f = fixture();
        put_media(&f, "i.redd.it/pic.jpg", b"x");
        let flag = AtomicBool::new(true);
        assert!(matches!(
            repair_index(&f.resolver, &f.files, &f.store, Some(&flag)),
            Err(CacheError::Interrupted)
        ));
    }
}
