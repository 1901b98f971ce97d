//! Metadata resolution: canonical artist/album identity and cover art.
//!
//! [`MusicBrainzResolver`] searches MusicBrainz for the album's release
//! group, then asks the Cover Art Archive for approved front covers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::MetadataError;
use crate::protocol_constants::USER_AGENT;

const MUSICBRAINZ_BASE: &str = "https://musicbrainz.org/ws/2";
const COVER_ART_BASE: &str = "https://coverartarchive.org";
const RESOLVER_TIMEOUT_SECS: u64 = 10;
const SEARCH_LIMIT: &str = "10";

/// Identity and cover art found for an artist/album pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub artist_id: String,
    pub album_id: String,
    /// Candidate cover image URLs, best first.
    pub art: Vec<String>,
}

/// Maps partial tag data to canonical identity and cover art.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Looks up the release group for `artist`/`album`.
    async fn resolve(
        &self,
        artist: &str,
        album: &str,
        genre: Option<&str>,
    ) -> Result<Resolution, MetadataError>;

    /// Downloads one of the URLs returned in [`Resolution::art`].
    async fn fetch_art(&self, url: &str) -> Result<Bytes, MetadataError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Null Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Resolver used when lookups are disabled. Never finds art.
#[derive(Debug, Clone, Default)]
pub struct NullResolver;

#[async_trait]
impl Resolver for NullResolver {
    async fn resolve(
        &self,
        _artist: &str,
        _album: &str,
        _genre: Option<&str>,
    ) -> Result<Resolution, MetadataError> {
        Ok(Resolution::default())
    }

    async fn fetch_art(&self, url: &str) -> Result<Bytes, MetadataError> {
        Err(MetadataError::Resolver(format!(
            "art download disabled: {url}"
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MusicBrainz Resolver
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ReleaseGroupSearch {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<ReleaseGroup>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroup {
    id: String,
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
    #[serde(rename = "secondary-types", default)]
    secondary_types: Vec<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
    artist: Option<CreditedArtist>,
}

#[derive(Debug, Deserialize)]
struct CreditedArtist {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CoverArtList {
    #[serde(default)]
    images: Vec<CoverImage>,
}

#[derive(Debug, Deserialize)]
struct CoverImage {
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    approved: bool,
    image: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    large: Option<String>,
}

/// First plain studio album not credited to "Various Artists".
fn pick_release_group(search: ReleaseGroupSearch) -> Option<ReleaseGroup> {
    search.release_groups.into_iter().find(|group| {
        group.primary_type.as_deref() == Some("Album")
            && group.secondary_types.is_empty()
            && !group
                .artist_credit
                .first()
                .is_some_and(|credit| credit.name.contains("Various"))
    })
}

/// Approved front covers, preferring the large thumbnail.
fn front_covers(list: CoverArtList) -> Vec<String> {
    list.images
        .into_iter()
        .filter(|image| image.approved && image.types.iter().any(|t| t == "Front"))
        .filter_map(|image| image.thumbnails.large.or(image.image))
        .collect()
}

/// [`Resolver`] backed by the MusicBrainz and Cover Art Archive web services.
#[derive(Debug, Clone)]
pub struct MusicBrainzResolver {
    client: Client,
    musicbrainz_base: String,
    cover_art_base: String,
}

impl MusicBrainzResolver {
    /// Creates a resolver against the public services.
    pub fn new() -> Result<Self, MetadataError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(RESOLVER_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, MUSICBRAINZ_BASE, COVER_ART_BASE))
    }

    /// Creates a resolver with a custom client and service roots.
    #[must_use]
    pub fn with_client(
        client: Client,
        musicbrainz_base: impl Into<String>,
        cover_art_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            musicbrainz_base: musicbrainz_base.into(),
            cover_art_base: cover_art_base.into(),
        }
    }

    fn search_url(&self, artist: &str, album: &str) -> Result<Url, MetadataError> {
        let query = format!(
            "releasegroup:\"{}\" AND artist:\"{}\" AND primarytype:album",
            escape_lucene(album),
            escape_lucene(artist)
        );
        Url::parse_with_params(
            &format!("{}/release-group/", self.musicbrainz_base),
            &[("query", query.as_str()), ("fmt", "json"), ("limit", SEARCH_LIMIT)],
        )
        .map_err(|e| MetadataError::Resolver(e.to_string()))
    }
}

/// Escapes characters that terminate a quoted Lucene phrase.
fn escape_lucene(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl Resolver for MusicBrainzResolver {
    async fn resolve(
        &self,
        artist: &str,
        album: &str,
        genre: Option<&str>,
    ) -> Result<Resolution, MetadataError> {
        log::debug!(
            "[Resolver] Looking up {} - {} (genre: {})",
            artist,
            album,
            genre.unwrap_or("unknown")
        );

        let search: ReleaseGroupSearch = self
            .client
            .get(self.search_url(artist, album)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let group = pick_release_group(search).ok_or_else(|| MetadataError::NoMatch {
            artist: artist.to_string(),
            album: album.to_string(),
        })?;
        let artist_id = group
            .artist_credit
            .first()
            .and_then(|credit| credit.artist.as_ref())
            .map(|a| a.id.clone())
            .unwrap_or_default();

        let covers_url = format!("{}/release-group/{}", self.cover_art_base, group.id);
        let response = self.client.get(&covers_url).send().await?;
        let art = if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Release group exists but nobody uploaded art for it.
            Vec::new()
        } else {
            front_covers(response.error_for_status()?.json().await?)
        };

        log::info!(
            "[Resolver] Resolved {} - {} to release group {} ({} cover(s))",
            artist,
            album,
            group.id,
            art.len()
        );

        Ok(Resolution {
            artist_id,
            album_id: group.id,
            art,
        })
    }

    async fn fetch_art(&self, url: &str) -> Result<Bytes, MetadataError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes)
    }
}
