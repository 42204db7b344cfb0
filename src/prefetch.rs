//! Background batch prefetch of submission media.
//!
//! The UI never performs network or disk I/O; it hands a batch of
//! (post, URL) work items to [`prefetch_batch`], which drains them on a
//! rayon worker pool. Each worker resolves the provider URL through a
//! collaborator trait (with a bounded timeout), skips cache hits,
//! downloads misses, and commits through the coordinator. Per-item
//! failures are logged and counted, never aborting the batch.
//!
//! Cancellation is cooperative: the shared shutdown flag is checked
//! before each item, so a torn-down view stops its workers within one
//! item's worth of work.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::cache::MediaCache;
use crate::error::{CacheError, CacheResult};
use crate::metadata::MetadataUpdate;
use crate::resolver::normalize::{normalize_media_url, redgifs_watch_to_media};

/// Resolves a post's raw media URL into a direct download URL.
///
/// Implementations may follow redirects or call provider APIs; they
/// must respect the timeout and surface overruns as
/// [`CacheError::ResolveTimeout`].
pub trait MediaUrlResolver: Sync {
    /// Resolve `url` to a directly downloadable URL.
    fn resolve_media_url(&self, url: &str, timeout: Duration) -> CacheResult<String>;
}

/// Downloads raw bytes for a direct media URL.
pub trait MediaFetcher: Sync {
    /// Fetch the full contents behind `url`.
    fn fetch(&self, url: &str, timeout: Duration) -> CacheResult<Vec<u8>>;
}

/// One unit of prefetch work.
#[derive(Debug, Clone)]
pub struct PrefetchItem {
    /// Post the media belongs to.
    pub post_id: String,
    /// Raw media URL as it appears on the submission.
    pub url: String,
    /// Metadata to merge on commit (moderation state, author, ...).
    pub update: MetadataUpdate,
}

/// Tuning for a prefetch run.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Worker threads; 0 lets rayon pick.
    pub workers: usize,
    /// Bound on each network-facing collaborator call.
    pub network_timeout: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            network_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&crate::config::Config> for PrefetchConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            workers: config.workers,
            network_timeout: Duration::from_secs(config.network_timeout_secs),
        }
    }
}

/// What a prefetch run did, per item.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchSummary {
    /// Items downloaded and committed.
    pub downloaded: usize,
    /// Items whose media was already cached (metadata still merged).
    pub already_cached: usize,
    /// Items abandoned because shutdown was requested.
    pub skipped: usize,
    /// Items that failed (bad URL, resolution or download error).
    pub failed: usize,
}

/// Drain a batch of prefetch items on a worker pool.
///
/// Items for distinct cache keys run in parallel; the coordinator
/// serializes any that collide on a key. The returned summary accounts
/// for every item exactly once.
///
/// # Errors
///
/// Only pool construction can fail; item-level problems land in the
/// summary's `failed` count.
pub fn prefetch_batch(
    cache: &MediaCache,
    url_resolver: &dyn MediaUrlResolver,
    fetcher: &dyn MediaFetcher,
    items: &[PrefetchItem],
    config: &PrefetchConfig,
    shutdown: Option<Arc<AtomicBool>>,
) -> CacheResult<PrefetchSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| CacheError::Io(std::io::Error::other(e)))?;

    let downloaded = AtomicUsize::new(0);
    let already_cached = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    pool.install(|| {
        items.par_iter().for_each(|item| {
            if shutdown
                .as_deref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }

            match prefetch_one(cache, url_resolver, fetcher, item, config) {
                Ok(ItemOutcome::Downloaded) => {
                    downloaded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(ItemOutcome::AlreadyCached) => {
                    already_cached.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    log::warn!(
                        "Prefetch failed for post {} url {}: {}",
                        item.post_id,
                        item.url,
                        e
                    );
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    });

    Ok(PrefetchSummary {
        downloaded: downloaded.load(Ordering::Relaxed),
        already_cached: already_cached.load(Ordering::Relaxed),
        skipped: skipped.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    })
}

enum ItemOutcome {
    Downloaded,
    AlreadyCached,
}

/// Process one item: resolve, check cache, download on miss, commit.
fn prefetch_one(
    cache: &MediaCache,
    url_resolver: &dyn MediaUrlResolver,
    fetcher: &dyn MediaFetcher,
    item: &PrefetchItem,
    config: &PrefetchConfig,
) -> CacheResult<ItemOutcome> {
    let normalized = normalize_media_url(&item.url);

    // Cache prediction: a RedGifs watch URL has a predictable media URL;
    // if that is already cached, skip the network resolution entirely.
    let direct = match redgifs_watch_to_media(&normalized) {
        Some(predicted) if cache.exists(&predicted) => {
            log::debug!("Cache hit for predicted URL: {}", predicted);
            predicted
        }
        _ => url_resolver.resolve_media_url(&normalized, config.network_timeout)?,
    };

    let key = cache.resolver().cache_key(&direct)?;
    let path = cache.resolver().media_path(&key);

    if cache.exists_path(&path) {
        // Hit: no download, but metadata still merges so moderation
        // state and the media reference stay current.
        cache.write(
            &item.post_id,
            item.update
                .clone()
                .with_media_path(key.relative())
                .with_resolved_url(direct),
        )?;
        return Ok(ItemOutcome::AlreadyCached);
    }

    let bytes = fetcher.fetch(&direct, config.network_timeout)?;
    cache.commit_download(
        &direct,
        &bytes,
        &item.post_id,
        item.update.clone().with_resolved_url(direct.clone()),
    )?;
    Ok(ItemOutcome::Downloaded)
}
