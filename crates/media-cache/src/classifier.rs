//! URL classification: which URLs are cacheable and what kind of media they hold

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension tokens that mark a URL as a cacheable image
const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".webp", ".bmp", ".tiff", ".svg", ".gif", ".ico", ".avif",
];

/// Extension tokens that disqualify a URL even if it also carries an image token
const UNSUPPORTED_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".mkv", ".gifv", ".mp3", ".wav", ".ogg",
    ".m4a",
];

/// Raster image tokens (everything supported except SVG)
const RASTER_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".webp", ".bmp", ".tiff", ".gif", ".ico", ".avif",
];

/// Kind of media held by a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Svg,
    Badge,
    Avatar,
    Other,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Svg => "svg",
            MediaType::Badge => "badge",
            MediaType::Avatar => "avatar",
            MediaType::Other => "other",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a URL may be stored in the media cache
///
/// Both lists are substring matches against the lowercased URL, so the
/// deny-list has to win: `clip.webm?poster=.png` is a video, not an image.
pub fn is_supported(url: &str) -> bool {
    let url = url.to_lowercase();

    if UNSUPPORTED_EXTENSIONS.iter().any(|ext| url.contains(ext)) {
        return false;
    }

    SUPPORTED_EXTENSIONS.iter().any(|ext| url.contains(ext))
}

/// Derive the media type of a URL
///
/// Path keywords take priority over the extension, and badge keywords take
/// priority over avatar keywords.
pub fn classify(url: &str) -> MediaType {
    let url = url.to_lowercase();

    if url.contains("badge") || url.contains("achievement") {
        MediaType::Badge
    } else if url.contains("avatar") || url.contains("profile") {
        MediaType::Avatar
    } else if url.contains(".svg") {
        MediaType::Svg
    } else if RASTER_EXTENSIONS.iter().any(|ext| url.contains(ext)) {
        MediaType::Image
    } else {
        MediaType::Other
    }
}

/// Best-effort MIME type for a URL, used when the response omits one
pub fn content_type_for(url: &str) -> &'static str {
    let url = url.to_lowercase();
    let table: &[(&str, &'static str)] = &[
        (".svg", "image/svg+xml"),
        (".png", "image/png"),
        (".jpeg", "image/jpeg"),
        (".jpg", "image/jpeg"),
        (".webp", "image/webp"),
        (".gif", "image/gif"),
        (".avif", "image/avif"),
        (".bmp", "image/bmp"),
        (".tiff", "image/tiff"),
        (".ico", "image/x-icon"),
    ];

    table
        .iter()
        .find(|(ext, _)| url.contains(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}
