//! Persistent per-post metadata store and the submission index.
//!
//! Each post's metadata lives in its own JSON file under the sharded
//! metadata subtree; the submission index is a single JSON object
//! mapping post ID to the record's relative path. The index is a
//! denormalized lookup accelerator: it must always be reconstructible by
//! rescanning the metadata directory, which is exactly what repair does.
//!
//! # Persistence discipline
//!
//! Both record writes and index saves go temp-file-then-rename so a
//! crash mid-write leaves the previous version intact, and
//! [`MetadataStore::save_index`] serializes a point-in-time snapshot of
//! the map, never the live structure. Background workers keep inserting
//! while a save is in flight; iterating the live map during
//! serialization is the dictionary-mutated-during-iteration crash this
//! design exists to rule out.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use crate::error::{CacheError, CacheResult};
use crate::resolver::PathResolver;

use super::record::{MetadataUpdate, PostMetadata};

/// Store for per-post metadata records plus the in-memory submission
/// index (post ID → relative metadata path, forward slashes).
#[derive(Debug)]
pub struct MetadataStore {
    resolver: Arc<PathResolver>,
    index: RwLock<HashMap<String, String>>,
    // Serializes read-modify-write cycles on individual record files.
    write_lock: Mutex<()>,
}

impl MetadataStore {
    /// Create an empty store over the resolver's metadata layout.
    ///
    /// Call [`MetadataStore::load_index`] before trusting reads.
    #[must_use]
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self {
            resolver,
            index: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the on-disk index into memory, replacing current contents.
    ///
    /// Degrades rather than fails: a missing file is an empty index, an
    /// unparseable file is an empty index with a warning (repair can
    /// rebuild the knowledge from the metadata directory), and corrupt
    /// individual entries are skipped with a warning.
    ///
    /// Returns the number of entries loaded.
    pub fn load_index(&self) -> CacheResult<usize> {
        let path = self.resolver.index_path();
        let loaded = match fs::read_to_string(&path) {
            Ok(content) => match parse_index(&content) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!(
                        "Submission index {} unreadable ({}), starting empty; run repair to rebuild",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No submission index at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        let count = loaded.len();
        let mut index = self.index.write().expect("submission index lock poisoned");
        *index = loaded;
        log::info!("Loaded submission index with {} entries", count);
        Ok(count)
    }

    /// Persist the in-memory index to its fixed on-disk location.
    ///
    /// Takes a snapshot of the map before serializing, so concurrent
    /// `write` calls during the save are safe, and the save observes
    /// either the pre-insert or post-insert state of each entry. The
    /// file itself is replaced atomically.
    pub fn save_index(&self) -> CacheResult<()> {
        let snapshot = self.index_snapshot();
        let path = self.resolver.index_path();

        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CacheError::IndexCorrupt(e.to_string()))?;
        write_atomically(&path, json.as_bytes())?;
        log::debug!(
            "Saved submission index ({} entries) to {}",
            snapshot.len(),
            path.display()
        );
        Ok(())
    }

    /// Create or merge a metadata record for a post.
    ///
    /// Merge semantics are field-wise last-write-wins: supplied fields
    /// overwrite, omitted fields are preserved (see
    /// [`PostMetadata::apply`]). The record file is replaced atomically
    /// and the index entry is inserted in memory; the index file is only
    /// touched by [`MetadataStore::save_index`].
    ///
    /// Returns the merged record.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidPostId`] for hostile IDs,
    /// [`CacheError::WriteFailed`] when the record cannot be persisted
    /// (nothing is registered in that case).
    pub fn write(&self, post_id: &str, update: MetadataUpdate) -> CacheResult<PostMetadata> {
        let path = self.resolver.metadata_path(post_id)?;
        let relative = self.resolver.metadata_relative(post_id)?;

        let _guard = self.write_lock.lock().expect("metadata write lock poisoned");

        let mut record = match read_record(&path) {
            Some(existing) => existing,
            None => PostMetadata::new(post_id),
        };
        record.apply(update);

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| CacheError::WriteFailed {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
        write_atomically(&path, json.as_bytes())?;

        self.index
            .write()
            .expect("submission index lock poisoned")
            .insert(post_id.to_string(), relative);

        Ok(record)
    }

    /// Look up a post's metadata via the submission index.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] when the post is not in the index or its
    /// record file is missing/unreadable. Callers decide whether that
    /// means cache-miss or time-to-repair.
    pub fn read(&self, post_id: &str) -> CacheResult<PostMetadata> {
        let relative = {
            let index = self.index.read().expect("submission index lock poisoned");
            index.get(post_id).cloned()
        };
        let Some(relative) = relative else {
            return Err(CacheError::NotFound(post_id.to_string()));
        };

        let path = self.resolver.metadata_path_from_relative(&relative);
        read_record(&path).ok_or_else(|| {
            log::debug!(
                "Index entry for {} points at missing/invalid record {}",
                post_id,
                path.display()
            );
            CacheError::NotFound(post_id.to_string())
        })
    }

    /// Point-in-time copy of the index map.
    #[must_use]
    pub fn index_snapshot(&self) -> HashMap<String, String> {
        self.index
            .read()
            .expect("submission index lock poisoned")
            .clone()
    }

    /// Replace the whole in-memory index (repair rebuilding knowledge
    /// from the metadata directory).
    pub fn replace_index(&self, entries: HashMap<String, String>) {
        let mut index = self.index.write().expect("submission index lock poisoned");
        *index = entries;
    }

    /// Insert an index entry directly (repair rebuilding knowledge).
    pub fn insert_index_entry(&self, post_id: &str, relative: &str) {
        self.index
            .write()
            .expect("submission index lock poisoned")
            .insert(post_id.to_string(), relative.to_string());
    }

    /// Remove an index entry. Returns whether it was present.
    pub fn remove_index_entry(&self, post_id: &str) -> bool {
        self.index
            .write()
            .expect("submission index lock poisoned")
            .remove(post_id)
            .is_some()
    }

    /// Number of indexed posts.
    #[must_use]
    pub fn index_len(&self) -> usize {
        self.index.read().expect("submission index lock poisoned").len()
    }

    /// Empty the in-memory index (cache clear).
    pub fn reset(&self) {
        self.index.write().expect("submission index lock poisoned").clear();
    }

    /// The resolver this store maps paths with.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }
}

/// Parse the index file contents, skipping corrupt entries.
///
/// The format is a flat JSON object of post ID to relative path. Any
/// value that is not a string is dropped with a warning; a file that is
/// not a JSON object at all is an error the caller absorbs.
fn parse_index(content: &str) -> Result<HashMap<String, String>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let Value::Object(entries) = value else {
        return Err("index root is not an object".to_string());
    };

    let mut map = HashMap::with_capacity(entries.len());
    for (post_id, entry) in entries {
        match entry {
            Value::String(relative) => {
                map.insert(post_id, relative);
            }
            other => {
                log::warn!("Skipping corrupt index entry for {post_id}: {other}");
            }
        }
    }
    Ok(map)
}

/// Read and parse one record file; `None` when missing or invalid.
fn read_record(path: &Path) -> Option<PostMetadata> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Invalid metadata record {}: {}", path.display(), e);
            None
        }
    }
}

/// Write a file via a temporary sibling and an atomic rename, creating
/// parent directories as needed. Failures clean up the temporary file
/// and surface as [`CacheError::WriteFailed`] with nothing committed.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let wrapped = |source: std::io::Error| CacheError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrapped)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = std::path::PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(wrapped(e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(wrapped(e));
    }
    Ok(())
}
