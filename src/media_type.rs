//! Media kind detection for cached files.
//!
//! Classification is extension-first, falling back to magic-byte sniffing
//! when the extension is absent or unknown. RedGifs-hosted files are
//! forced to video unless the path names an image extension, matching how
//! that provider serves extension-less video URLs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Kind of a cached media file, as far as rendering cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image (jpg, png, bmp, webp, ...).
    Image,
    /// Animated image (gif).
    AnimatedImage,
    /// Video (mp4, webm, mkv, ...).
    Video,
    /// Could not be classified.
    Unknown,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv", "flv"];

/// Classify a path by its extension alone. No I/O.
#[must_use]
pub fn classify_extension(path: &Path) -> MediaKind {
    let Some(ext) = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
    else {
        return MediaKind::Unknown;
    };

    if ext == "gif" {
        MediaKind::AnimatedImage
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Unknown
    }
}

/// Classify a file header by magic bytes. No I/O; callers supply the header.
#[must_use]
pub fn classify_header(header: &[u8]) -> MediaKind {
    // MP4: "ftyp" brand at offset 4.
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        return MediaKind::Video;
    }
    // WebM / Matroska EBML header.
    if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return MediaKind::Video;
    }
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return MediaKind::Image;
    }
    if header.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return MediaKind::Image;
    }
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        // Telling a static GIF from an animated one needs frame parsing;
        // treat all GIFs as animated like the rest of the pipeline does.
        return MediaKind::AnimatedImage;
    }
    if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
        return MediaKind::Image;
    }
    MediaKind::Unknown
}

/// Classify a cached media file.
///
/// The extension decides when it is recognized; otherwise the first bytes
/// of the file are sniffed. A missing or unreadable file classifies as
/// [`MediaKind::Unknown`] rather than erroring, since callers only use
/// the kind to pick a renderer.
#[must_use]
pub fn classify_file(path: &Path) -> MediaKind {
    // RedGifs paths are video regardless of extension, except explicit
    // image extensions (the provider also hosts preview stills).
    let lower = path.to_string_lossy().to_ascii_lowercase();
    if lower.contains("redgifs.com") {
        let by_ext = classify_extension(path);
        if matches!(by_ext, MediaKind::Image | MediaKind::AnimatedImage) {
            return by_ext;
        }
        log::debug!("RedGifs media forced to video: {}", path.display());
        return MediaKind::Video;
    }

    let by_ext = classify_extension(path);
    if by_ext != MediaKind::Unknown {
        return by_ext;
    }

    let mut header = [0u8; 12];
    match File::open(path).and_then(|mut f| f.read(&mut header)) {
        Ok(n) => classify_header(&header[..n]),
        Err(e) => {
            log::debug!("Could not sniff {}: {}", path.display(), e);
            MediaKind::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extensions_classify_without_io() {
        assert_eq!(
            classify_extension(Path::new("a/pic.JPG")),
            MediaKind::Image
        );
        assert_eq!(
            classify_extension(Path::new("a/anim.gif")),
            MediaKind::AnimatedImage
        );
        assert_eq!(
            classify_extension(Path::new("a/clip.mp4")),
            MediaKind::Video
        );
        assert_eq!(
            classify_extension(Path::new("a/blob")),
            MediaKind::Unknown
        );
    }

    #[test]
    fn magic_bytes_classify_common_formats() {
        assert_eq!(
            classify_header(&[0xFF, 0xD8, 0xFF, 0xE0]),
            MediaKind::Image
        );
        assert_eq!(
            classify_header(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            MediaKind::Image
        );
        assert_eq!(classify_header(b"GIF89all"), MediaKind::AnimatedImage);
        assert_eq!(
            classify_header(&[0, 0, 0, 0x18, b'f', b't', b'y', b'p']),
            MediaKind::Video
        );
        assert_eq!(classify_header(b"RIFF\x00\x00\x00\x00WEBP"), MediaKind::Image);
        assert_eq!(classify_header(b"garbage"), MediaKind::Unknown);
    }

    #[test]
    fn redgifs_paths_default_to_video() {
        let path = PathBuf::from("media/media.redgifs.com/SomeGif");
        assert_eq!(classify_file(&path), MediaKind::Video);
        let still = PathBuf::from("media/i.redgifs.com/SomeGif.jpg");
        assert_eq!(classify_file(&still), MediaKind::Image);
    }

    #[test]
    fn sniffing_reads_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headerless");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE1, 0x00]).unwrap();
        assert_eq!(classify_file(&path), MediaKind::Image);

        let missing = dir.path().join("nope");
        assert_eq!(classify_file(&missing), MediaKind::Unknown);
    }
}
