//! Embedded tag extraction backed by `lofty`.

use std::path::Path;

use bytes::Bytes;
use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::Tag;

use crate::error::MetadataError;
use crate::protocol::DeclaredTags;

/// Tag values found in a file. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// First embedded picture, if any.
    pub picture: Option<Bytes>,
}

/// Tags after merging embedded values with what the client declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    /// Empty when neither source names an album.
    pub album: String,
    pub genre: Option<String>,
    pub picture: Option<Bytes>,
}

impl EmbeddedTags {
    /// Fills gaps from the announce tags; the file's own values win.
    ///
    /// Title and artist are required.
    pub fn merge(self, declared: &DeclaredTags) -> Result<TrackTags, MetadataError> {
        let pick = |embedded: Option<String>, declared: &Option<String>| {
            non_empty(embedded).or_else(|| non_empty(declared.clone()))
        };

        let title = pick(self.title, &declared.track).ok_or(MetadataError::MissingField("title"))?;
        let artist =
            pick(self.artist, &declared.artist).ok_or(MetadataError::MissingField("artist"))?;

        Ok(TrackTags {
            title,
            artist,
            album: pick(self.album, &declared.album).unwrap_or_default(),
            genre: pick(self.genre, &declared.genre),
            picture: self.picture,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads tags from a staged upload.
///
/// Implementations are blocking; callers run them on a blocking thread.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<EmbeddedTags, MetadataError>;
}

/// [`TagReader`] that detects the container and reads every tag `lofty` finds.
#[derive(Debug, Clone, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<EmbeddedTags, MetadataError> {
        let tagged_file =
            read_from_path(path).map_err(|e| MetadataError::TagRead(e.to_string()))?;
        let primary = tagged_file.primary_tag();
        let tags = tagged_file.tags();

        let first = |extract: fn(&Tag) -> Option<String>| {
            primary
                .into_iter()
                .chain(tags.iter())
                .find_map(|tag| non_empty(extract(tag)))
        };

        let picture = primary
            .into_iter()
            .chain(tags.iter())
            .find_map(|tag| tag.pictures().first())
            .map(|picture| Bytes::copy_from_slice(picture.data()));

        Ok(EmbeddedTags {
            title: first(|tag| tag.title().map(|v| v.into_owned())),
            artist: first(|tag| tag.artist().map(|v| v.into_owned())),
            album: first(|tag| tag.album().map(|v| v.into_owned())),
            genre: first(|tag| tag.genre().map(|v| v.into_owned())),
            picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(track: Option<&str>, artist: Option<&str>) -> DeclaredTags {
        DeclaredTags {
            track: track.map(str::to_string),
            artist: artist.map(str::to_string),
            album: Some("Holy Fire".to_string()),
            genre: None,
        }
    }

    #[test]
    fn embedded_values_take_precedence() {
        let embedded = EmbeddedTags {
            title: Some("Inhaler".into()),
            artist: Some("Foals".into()),
            ..Default::default()
        };
        let merged = embedded
            .merge(&declared(Some("Other"), Some("Someone")))
            .unwrap();
        assert_eq!(merged.title, "Inhaler");
        assert_eq!(merged.artist, "Foals");
        assert_eq!(merged.album, "Holy Fire");
    }

    #[test]
    fn declared_values_fill_gaps() {
        let embedded = EmbeddedTags {
            title: Some("   ".into()),
            ..Default::default()
        };
        let merged = embedded
            .merge(&declared(Some("Late Night"), Some("Foals")))
            .unwrap();
        assert_eq!(merged.title, "Late Night");
        assert_eq!(merged.artist, "Foals");
    }

    #[test]
    fn missing_title_or_artist_is_an_error() {
        assert!(matches!(
            EmbeddedTags::default().merge(&declared(None, Some("Foals"))),
            Err(MetadataError::MissingField("title"))
        ));
        assert!(matches!(
            EmbeddedTags::default().merge(&declared(Some("Spanish Sahara"), None)),
            Err(MetadataError::MissingField("artist"))
        ));
    }

    #[test]
    fn lofty_reader_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(
            LoftyTagReader.read(&path),
            Err(MetadataError::TagRead(_))
        ));
    }
}
