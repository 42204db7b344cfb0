//! Media URL normalization.
//!
//! Media providers hand out several equivalent URL spellings for the same
//! underlying file (mobile hosts, iframe embeds, `.gifv` wrappers). The
//! resolver normalizes these before deriving a cache key so that every
//! spelling of a URL lands on the same cached file.

use regex::Regex;
use std::sync::OnceLock;

/// Normalize a media URL to its canonical provider form.
///
/// Applied transformations:
/// - RedGifs `v3.redgifs.com/watch/` and `m.redgifs.com` hosts become
///   `www.redgifs.com`
/// - RedGifs iframe URLs (`/ifr/`) become watch URLs (`/watch/`)
/// - Imgur `.gifv` wrappers become direct `.mp4` URLs
///
/// The function is pure string rewriting; it performs no network I/O and
/// does not validate that the URL parses.
#[must_use]
pub fn normalize_media_url(url: &str) -> String {
    let mut url = url.to_string();

    if url.contains("v3.redgifs.com/watch/") {
        url = url.replace("v3.redgifs.com/watch/", "www.redgifs.com/watch/");
        log::debug!("Normalized v3.redgifs URL to: {}", url);
    }
    if url.contains("redgifs.com/ifr/") {
        url = url.replace("/ifr/", "/watch/");
        log::debug!("Normalized iframe URL to: {}", url);
    }
    if url.contains("m.redgifs.com") && !url.contains("www.redgifs.com") {
        url = url.replace("m.redgifs.com", "www.redgifs.com");
        log::debug!("Normalized mobile URL to: {}", url);
    }
    if url.ends_with(".gifv") {
        url = format!("{}.mp4", url.trim_end_matches(".gifv"));
    }

    url
}

/// Predict the direct media URL for a RedGifs watch page.
///
/// Watch URLs like `https://www.redgifs.com/watch/somegifid` serve HTML;
/// the actual video lives at `https://media.redgifs.com/SomeGifId.mp4`
/// with the ID in word-capitalized form. Returns `None` when the URL is
/// not a watch URL or carries no recognizable ID.
#[must_use]
pub fn redgifs_watch_to_media(url: &str) -> Option<String> {
    static WATCH_ID: OnceLock<Regex> = OnceLock::new();
    let re = WATCH_ID.get_or_init(|| Regex::new(r"/watch/([A-Za-z]+)").expect("valid regex"));

    if !url.contains("redgifs.com") {
        return None;
    }
    let id = re.captures(url)?.get(1)?.as_str();
    Some(format!("https://media.redgifs.com/{}.mp4", capitalize_words(id)))
}

/// Extract the RedGifs ID from a URL path, if present.
///
/// Used when deriving a filename for RedGifs URLs that lack a clean path
/// segment (watch pages, extension-less media links).
#[must_use]
pub fn redgifs_id_from_path(path: &str) -> Option<&str> {
    static TRAILING_ID: OnceLock<Regex> = OnceLock::new();
    let re = TRAILING_ID
        .get_or_init(|| Regex::new(r"([A-Za-z]+)(?:\.mp4)?$").expect("valid regex"));
    re.captures(path)?.get(1).map(|m| m.as_str())
}

/// Convert a Reddit post URL to its JSON endpoint equivalent.
#[must_use]
pub fn ensure_json_url(url: &str) -> String {
    if url.ends_with(".json") {
        return url.to_string();
    }
    format!("{}.json", url.trim_end_matches('/'))
}

/// Clean a filename to make it safe for the filesystem.
///
/// Returns `None` for empty or dot-only input so callers can fall back
/// to a hash-derived name. Percent-encoded `..` segments reach this
/// function decoded and must not become path components.
#[must_use]
pub fn clean_filename(filename: &str) -> Option<String> {
    if filename.is_empty() || filename.chars().all(|c| c == '.') {
        return None;
    }
    Some(
        filename
            .replace(['?', '&', '='], "_")
            .replace(['/', '\\', ':'], "_"),
    )
}

/// Capitalize each lowercase word run in a RedGifs ID.
///
/// RedGifs media URLs use word-capitalized IDs (`confusedbraveheron` ->
/// `ConfusedBraveHeron` only when the source already carries case
/// boundaries; an all-lowercase ID capitalizes as a single word).
fn capitalize_words(id: &str) -> String {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    let re = WORDS.get_or_init(|| Regex::new(r"[a-z]+").expect("valid regex"));

    let mut out = String::with_capacity(id.len());
    for word in re.find_iter(&id.to_lowercase()) {
        let mut chars = word.as_str().chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        id.to_string()
    } else {
        out
    }
}
