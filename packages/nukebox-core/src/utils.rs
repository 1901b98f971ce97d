//! General utilities shared across the application.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem Names
// ─────────────────────────────────────────────────────────────────────────────

/// Makes a tag value safe to use as a single file name component.
///
/// Every character outside `[A-Za-z0-9_.-]` becomes `-`, so path separators,
/// whitespace and non-ASCII text cannot escape the target directory.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Returns the final component of a client-supplied file name.
///
/// Clients send whatever path they had locally; only the base name is kept.
/// Falls back to `"upload"` for names with no usable component (`""`, `".."`).
#[must_use]
pub fn client_basename(filename: &str) -> String {
    let normalized = filename.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "upload".to_string())
}

/// Returns the lowercase extension of a file name, if any.
#[must_use]
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("Birch Tree"), "Birch-Tree");
        assert_eq!(sanitize_component("../etc/passwd"), "..-etc-passwd");
        assert_eq!(sanitize_component("What_Went-Down.v2"), "What_Went-Down.v2");
    }

    #[test]
    fn sanitize_replaces_non_ascii() {
        assert_eq!(sanitize_component("Café"), "Caf-");
    }

    #[test]
    fn basename_strips_client_directories() {
        assert_eq!(client_basename("/sdcard/Music/song.mp3"), "song.mp3");
        assert_eq!(client_basename("C:\\Users\\me\\song.mp3"), "song.mp3");
        assert_eq!(client_basename("song.mp3"), "song.mp3");
    }

    #[test]
    fn basename_falls_back_for_empty_names() {
        assert_eq!(client_basename(""), "upload");
        assert_eq!(client_basename(".."), "upload");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of("Song.MP3").as_deref(), Some("mp3"));
        assert_eq!(extension_of("noext"), None);
    }
}
