//! Deterministic mapping from media URLs and post IDs to on-disk paths.
//!
//! The resolver is the leaf of the cache subsystem: a pure function from
//! URL to path with no I/O and no randomness, so repeated calls for the
//! same URL agree across workers and across process restarts. Cache hits
//! after a restart depend on this.
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//!   media/<domain>/<filename>          one file per cached media item
//!   metadata/<shard>/<post_id>.json    one record per submission
//!   metadata/index.json                submission index
//! ```
//!
//! Media files are partitioned by source domain and metadata files by a
//! two-character ID prefix to bound directory fan-out.

pub mod normalize;

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{CacheError, CacheResult};
use normalize::{clean_filename, normalize_media_url, redgifs_id_from_path};

/// Name of the media subtree under the cache root.
pub const MEDIA_DIR: &str = "media";
/// Name of the metadata subtree under the cache root.
pub const METADATA_DIR: &str = "metadata";
/// Fixed name of the submission index file inside the metadata subtree.
pub const INDEX_FILE: &str = "index.json";

/// Deterministic identifier for one cached media file.
///
/// Derived from the media URL as `domain` plus a sanitized `filename`.
/// The string form (`domain/filename`, always forward slashes) is what
/// metadata records and the submission index store; the platform path
/// form is produced by [`PathResolver::media_path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    domain: String,
    filename: String,
}

impl CacheKey {
    /// Source domain this key is partitioned under.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Sanitized filename component.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Portable relative form used in metadata records and the index.
    #[must_use]
    pub fn relative(&self) -> String {
        format!("{}/{}", self.domain, self.filename)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.filename)
    }
}

/// Pure URL-to-path and post-ID-to-path mapping for one cache root.
///
/// Construction records the layout; no directories are created until a
/// write actually happens.
#[derive(Debug, Clone)]
pub struct PathResolver {
    media_root: PathBuf,
    metadata_root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for the given cache root.
    #[must_use]
    pub fn new(cache_root: &Path) -> Self {
        Self {
            media_root: cache_root.join(MEDIA_DIR),
            metadata_root: cache_root.join(METADATA_DIR),
        }
    }

    /// Root of the media subtree.
    #[must_use]
    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Root of the metadata subtree.
    #[must_use]
    pub fn metadata_root(&self) -> &Path {
        &self.metadata_root
    }

    /// Fixed path of the on-disk submission index.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.metadata_root.join(INDEX_FILE)
    }

    /// Derive the cache key for a media URL.
    ///
    /// The URL is normalized first so equivalent provider spellings
    /// (mobile hosts, iframe embeds, `.gifv` wrappers) agree on one key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidUrl`] when the URL cannot be parsed
    /// into a domain and identifier. Batch callers skip the item.
    pub fn cache_key(&self, raw_url: &str) -> CacheResult<CacheKey> {
        let url_str = normalize_media_url(raw_url);
        let parsed =
            Url::parse(&url_str).map_err(|_| CacheError::InvalidUrl(raw_url.to_string()))?;
        let domain = parsed
            .host_str()
            .filter(|h| !h.is_empty() && !h.chars().all(|c| c == '.'))
            .ok_or_else(|| CacheError::InvalidUrl(raw_url.to_string()))?
            .to_ascii_lowercase();

        let decoded_path = percent_decode(parsed.path());
        let last_segment = decoded_path.rsplit('/').next().unwrap_or("");

        let filename = if domain.ends_with("redgifs.com") {
            redgifs_filename(&url_str, &decoded_path, last_segment)
        } else {
            clean_filename(last_segment)
                .unwrap_or_else(|| fallback_filename(&url_str, &domain))
        };

        Ok(CacheKey { domain, filename })
    }

    /// Absolute on-disk path for a cache key.
    #[must_use]
    pub fn media_path(&self, key: &CacheKey) -> PathBuf {
        self.media_root.join(&key.domain).join(&key.filename)
    }

    /// Deterministically compute the cached file path for a media URL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidUrl`] when no cache key can be
    /// derived; see [`PathResolver::cache_key`].
    pub fn resolve(&self, url: &str) -> CacheResult<PathBuf> {
        Ok(self.media_path(&self.cache_key(url)?))
    }

    /// Absolute path for a portable relative media reference
    /// (`domain/filename`) as stored in metadata records.
    #[must_use]
    pub fn media_path_from_relative(&self, relative: &str) -> PathBuf {
        let mut path = self.media_root.clone();
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            path.push(component);
        }
        path
    }

    /// Portable relative form of an absolute media path, if it lives
    /// under this resolver's media root.
    #[must_use]
    pub fn relative_media(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.media_root).ok()?;
        let parts: Vec<&str> = rel.iter().filter_map(|c| c.to_str()).collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Deterministic metadata file location for a post ID.
    ///
    /// Records are sharded by the first two characters of the ID to
    /// avoid unbounded directory fan-out (Reddit IDs are base-36, so at
    /// most ~1.3k shard directories exist).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidPostId`] when the ID is empty or
    /// contains characters that would escape the metadata subtree.
    pub fn metadata_path(&self, post_id: &str) -> CacheResult<PathBuf> {
        let shard = metadata_shard(post_id)?;
        Ok(self
            .metadata_root
            .join(shard)
            .join(format!("{post_id}.json")))
    }

    /// Portable relative metadata reference (`shard/<id>.json`) as stored
    /// in the submission index.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidPostId`] for IDs that fail
    /// validation; see [`PathResolver::metadata_path`].
    pub fn metadata_relative(&self, post_id: &str) -> CacheResult<String> {
        let shard = metadata_shard(post_id)?;
        Ok(format!("{shard}/{post_id}.json"))
    }

    /// Absolute path for a portable relative metadata reference.
    #[must_use]
    pub fn metadata_path_from_relative(&self, relative: &str) -> PathBuf {
        let mut path = self.metadata_root.clone();
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            path.push(component);
        }
        path
    }
}

/// Validate a post ID and compute its shard directory name.
fn metadata_shard(post_id: &str) -> CacheResult<String> {
    if post_id.is_empty()
        || !post_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(CacheError::InvalidPostId(post_id.to_string()));
    }
    let shard: String = post_id.chars().take(2).collect();
    Ok(shard.to_ascii_lowercase())
}

/// Filename derivation for RedGifs URLs, which often lack a usable path
/// segment (watch pages, extension-less media links).
fn redgifs_filename(url: &str, decoded_path: &str, last_segment: &str) -> String {
    // Direct media URLs already carry a good filename.
    if last_segment.to_ascii_lowercase().ends_with(".mp4") {
        if let Some(name) = clean_filename(last_segment) {
            return name;
        }
    }
    if let Some(id) = redgifs_id_from_path(decoded_path) {
        return format!("{id}.mp4");
    }
    format!("redgif_{}.mp4", url_digest(url))
}

/// Hash-derived filename for URLs without a usable path segment.
///
/// The digest keys on the full URL so distinct URLs never share a
/// fallback name within a domain.
fn fallback_filename(url: &str, domain: &str) -> String {
    let extension = guess_extension(url, domain);
    format!("media_{}{}", url_digest(url), extension)
}

/// First 16 hex characters of the URL's SHA-256 digest.
fn url_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Guess a file extension from the URL tail for fallback names.
fn guess_extension(url: &str, domain: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.ends_with(".mp4") {
        ".mp4"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        ".jpg"
    } else if lower.ends_with(".png") {
        ".png"
    } else if lower.ends_with(".gif") {
        ".gif"
    } else if lower.ends_with(".webm") {
        ".webm"
    } else if domain.ends_with("redgifs.com") {
        ".mp4"
    } else {
        ""
    }
}

/// Minimal percent-decoding for URL path segments.
///
/// Invalid escapes are kept literally rather than rejected; the result
/// only ever feeds filename sanitization.
fn percent_decode(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &path[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn resolver() -> PathResolver {
        PathResolver::new(Path::new("/tmp/redcache-test"))
    }

    #[test]
    fn resolve_is_deterministic() {
        let r = resolver();
        let url = "https://i.redd.it/abcdef123456.jpg";
        assert_eq!(r.resolve(url).unwrap(), r.resolve(url).unwrap());
    }

    #[test]
    fn resolve_partitions_by_domain() {
        let r = resolver();
        let path = r.resolve("https://i.redd.it/abcdef123456.jpg").unwrap();
        assert!(path.starts_with(r.media_root().join("i.redd.it")));
        assert_eq!(path.file_name().unwrap(), "abcdef123456.jpg");
    }

    #[test]
    fn distinct_domains_yield_distinct_paths() {
        let r = resolver();
        let a = r.resolve("https://i.redd.it/pic.jpg").unwrap();
        let b = r.resolve("https://i.imgur.com/pic.jpg").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn query_characters_never_reach_the_filename() {
        let r = resolver();
        let key = r
            .cache_key("https://preview.redd.it/pic.jpg?width=640&s=abc")
            .unwrap();
        assert!(!key.filename().contains('?'));
        assert!(!key.filename().contains('&'));
    }

    #[test]
    fn equivalent_redgifs_spellings_share_a_key() {
        let r = resolver();
        let a = r.cache_key("https://v3.redgifs.com/watch/bravegif").unwrap();
        let b = r.cache_key("https://www.redgifs.com/watch/bravegif").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.filename(), "bravegif.mp4");
    }

    #[test]
    fn redgifs_media_url_keeps_its_filename() {
        let r = resolver();
        let key = r
            .cache_key("https://media.redgifs.com/BraveGif.mp4")
            .unwrap();
        assert_eq!(key.filename(), "BraveGif.mp4");
    }

    #[test]
    fn gifv_maps_to_mp4_key() {
        let r = resolver();
        let key = r.cache_key("https://i.imgur.com/abcd.gifv").unwrap();
        assert_eq!(key.filename(), "abcd.mp4");
    }

    #[test]
    fn bare_path_urls_get_distinct_hashed_filenames() {
        let r = resolver();
        let a = r.cache_key("https://example.com/").unwrap();
        let b = r.cache_key("https://example.com/?id=2").unwrap();
        assert_ne!(a.filename(), b.filename());
        assert!(a.filename().starts_with("media_"));
    }

    #[test]
    fn unparseable_url_is_invalid() {
        let r = resolver();
        assert!(matches!(
            r.resolve("not a url"),
            Err(CacheError::InvalidUrl(_))
        ));
        assert!(matches!(
            r.resolve("file:///etc/passwd"),
            Err(CacheError::InvalidUrl(_))
        ));
    }

    #[test]
    fn relative_round_trips_through_media_path() {
        let r = resolver();
        let key = r.cache_key("https://i.redd.it/pic.jpg").unwrap();
        let abs = r.media_path(&key);
        assert_eq!(r.relative_media(&abs).as_deref(), Some("i.redd.it/pic.jpg"));
        assert_eq!(r.media_path_from_relative(&key.relative()), abs);
    }

    #[test]
    fn metadata_path_shards_by_id_prefix() {
        let r = resolver();
        let path = r.metadata_path("abc123").unwrap();
        assert!(path.starts_with(r.metadata_root().join("ab")));
        assert_eq!(path.file_name().unwrap(), "abc123.json");
    }

    #[test]
    fn metadata_relative_uses_forward_slashes() {
        let r = resolver();
        assert_eq!(r.metadata_relative("abc123").unwrap(), "ab/abc123.json");
    }

    #[test]
    fn hostile_post_ids_are_rejected() {
        let r = resolver();
        for id in ["", "../escape", "a/b", "a\\b", "id with space"] {
            assert!(
                matches!(r.metadata_path(id), Err(CacheError::InvalidPostId(_))),
                "id {id:?} should be rejected"
            );
        }
    }

    #[test]
    fn percent_encoded_segments_are_decoded() {
        let r = resolver();
        let key = r.cache_key("https://i.redd.it/some%20pic.jpg").unwrap();
        assert_eq!(key.filename(), "some pic.jpg");
    }
}
