//! Archive.org item API client for per-recording detail pages
//!
//! Fetches metadata, track lists, and reviews for a recording identifier.
//! The expiring file cache is consulted before every network call and stores
//! the *processed* domain model, not the raw API payload, so a cache hit
//! skips all mapping work.
//!
//! The API is loosely typed: several metadata fields arrive as either a
//! single string or an array of strings, and numeric file attributes arrive
//! as strings. Mapping flattens and parses these defensively; a review fetch
//! failure is "no reviews", never a fatal error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cache::{CacheCategory, ExpiringFileCache};

/// Audio file extensions the client can play; everything else in `files[]`
/// (checksums, images, derived text) is ignored.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a", "shn", "wav"];

/// Processed metadata for one recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub identifier: String,
    pub title: String,
    pub date: String,
    pub venue: String,
    pub creator: String,
    pub description: String,
    pub setlist: String,
    pub source: String,
    pub taper: String,
    pub transferer: String,
    pub lineage: String,
}

/// One playable track of a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub filename: String,
    pub title: String,
    pub format: String,
    pub length_seconds: Option<f64>,
    pub size_bytes: Option<u64>,
    pub bitrate: Option<String>,
    pub sample_rate: Option<String>,
}

/// One listener review of a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub title: String,
    pub body: String,
    pub reviewer: String,
    pub date: String,
    pub stars: f64,
}

/// Everything the client shows on a recording detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingDetails {
    pub metadata: RecordingMetadata,
    pub tracks: Vec<Track>,
    pub reviews: Vec<Review>,
}

/// A field the API returns as either a single string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// First non-blank element, for scalar-like fields (venue, taper, ...)
    fn first_non_blank(&self) -> String {
        match self {
            StringOrList::One(s) => s.trim().to_string(),
            StringOrList::Many(list) => list
                .iter()
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Newline-joined non-blank elements, for list-like fields (description,
    /// setlist, lineage)
    fn joined(&self) -> String {
        match self {
            StringOrList::One(s) => s.trim().to_string(),
            StringOrList::Many(list) => list
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn flat(field: &Option<StringOrList>) -> String {
    field.as_ref().map(StringOrList::first_non_blank).unwrap_or_default()
}

fn flat_joined(field: &Option<StringOrList>) -> String {
    field.as_ref().map(StringOrList::joined).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    #[serde(default)]
    files: Vec<ApiFile>,
    metadata: Option<ApiMetadata>,
    #[serde(default)]
    reviews: Vec<ApiReview>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    #[serde(default)]
    name: String,
    format: Option<String>,
    size: Option<String>,
    length: Option<String>,
    title: Option<String>,
    bitrate: Option<String>,
    sample_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMetadata {
    identifier: Option<StringOrList>,
    title: Option<StringOrList>,
    date: Option<StringOrList>,
    venue: Option<StringOrList>,
    creator: Option<StringOrList>,
    description: Option<StringOrList>,
    setlist: Option<StringOrList>,
    source: Option<StringOrList>,
    taper: Option<StringOrList>,
    transferer: Option<StringOrList>,
    lineage: Option<StringOrList>,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
    #[serde(default)]
    reviewtitle: Option<String>,
    #[serde(default)]
    reviewbody: Option<String>,
    #[serde(default)]
    reviewer: Option<String>,
    #[serde(default)]
    reviewdate: Option<String>,
    #[serde(default)]
    stars: Option<String>,
}

pub struct RemoteMetadataClient {
    client: reqwest::Client,
    base_url: String,
    cache: ExpiringFileCache,
}

impl RemoteMetadataClient {
    pub fn new(base_url: String, cache: ExpiringFileCache) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            cache,
        }
    }

    /// Fetch metadata, tracks, and reviews for a recording
    pub async fn recording_details(&self, identifier: &str) -> Result<RecordingDetails> {
        Ok(RecordingDetails {
            metadata: self.metadata(identifier).await?,
            tracks: self.tracks(identifier).await?,
            reviews: self.reviews(identifier).await,
        })
    }

    /// Processed metadata for a recording, cached under the metadata category
    pub async fn metadata(&self, identifier: &str) -> Result<RecordingMetadata> {
        if let Some(cached) = self.cache.get(identifier, CacheCategory::Metadata).await {
            if let Ok(metadata) = serde_json::from_str(&cached) {
                debug!(identifier, "Metadata cache hit");
                return Ok(metadata);
            }
        }

        let item = self.fetch_item(identifier).await?;
        let metadata = map_metadata(identifier, item.metadata.as_ref());
        self.store(identifier, CacheCategory::Metadata, &metadata).await;
        Ok(metadata)
    }

    /// Playable tracks of a recording, cached under the tracks category.
    ///
    /// Sorted by filename, not by any embedded track-number field: source
    /// filenames reliably encode disc/track ordering while declared metadata
    /// frequently does not.
    pub async fn tracks(&self, identifier: &str) -> Result<Vec<Track>> {
        if let Some(cached) = self.cache.get(identifier, CacheCategory::Tracks).await {
            if let Ok(tracks) = serde_json::from_str(&cached) {
                debug!(identifier, "Tracks cache hit");
                return Ok(tracks);
            }
        }

        let item = self.fetch_item(identifier).await?;
        let tracks = map_tracks(&item.files);
        self.store(identifier, CacheCategory::Tracks, &tracks).await;
        Ok(tracks)
    }

    /// Reviews of a recording, cached under the reviews category. Reviews are
    /// supplementary: any fetch failure yields an empty list.
    pub async fn reviews(&self, identifier: &str) -> Vec<Review> {
        if let Some(cached) = self.cache.get(identifier, CacheCategory::Reviews).await {
            if let Ok(reviews) = serde_json::from_str(&cached) {
                debug!(identifier, "Reviews cache hit");
                return reviews;
            }
        }

        let reviews = match self.fetch_item(identifier).await {
            Ok(item) => item.reviews.iter().map(map_review).collect::<Vec<_>>(),
            Err(e) => {
                warn!(identifier, error = %e, "Review fetch failed; treating as no reviews");
                return Vec::new();
            }
        };
        self.store(identifier, CacheCategory::Reviews, &reviews).await;
        reviews
    }

    async fn fetch_item(&self, identifier: &str) -> Result<ItemResponse> {
        let url = format!("{}/{}", self.base_url, identifier);
        debug!(url = %url, "Fetching recording details");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Metadata API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Metadata API returned status {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse metadata API response")
    }

    async fn store<T: Serialize>(&self, identifier: &str, category: CacheCategory, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.cache.put(identifier, category, &json).await,
            Err(e) => warn!(identifier, error = %e, "Could not serialize cache unit"),
        }
    }
}

fn map_metadata(identifier: &str, api: Option<&ApiMetadata>) -> RecordingMetadata {
    let Some(api) = api else {
        return RecordingMetadata {
            identifier: identifier.to_string(),
            ..RecordingMetadata::default()
        };
    };

    let mapped_identifier = flat(&api.identifier);
    RecordingMetadata {
        identifier: if mapped_identifier.is_empty() {
            identifier.to_string()
        } else {
            mapped_identifier
        },
        title: flat(&api.title),
        date: flat(&api.date),
        venue: flat(&api.venue),
        creator: flat(&api.creator),
        description: flat_joined(&api.description),
        setlist: flat_joined(&api.setlist),
        source: flat(&api.source),
        taper: flat(&api.taper),
        transferer: flat(&api.transferer),
        lineage: flat_joined(&api.lineage),
    }
}

fn map_tracks(files: &[ApiFile]) -> Vec<Track> {
    let mut tracks: Vec<Track> = files
        .iter()
        .filter(|f| is_audio_file(&f.name))
        .map(|f| Track {
            filename: f.name.clone(),
            title: f
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| title_from_filename(&f.name)),
            format: f.format.clone().unwrap_or_default(),
            length_seconds: f.length.as_deref().and_then(parse_length),
            size_bytes: f.size.as_deref().and_then(|s| s.parse().ok()),
            bitrate: f.bitrate.clone(),
            sample_rate: f.sample_rate.clone(),
        })
        .collect();

    tracks.sort_by(|a, b| a.filename.cmp(&b.filename));
    tracks
}

fn map_review(api: &ApiReview) -> Review {
    Review {
        title: api.reviewtitle.clone().unwrap_or_default(),
        body: api.reviewbody.clone().unwrap_or_default(),
        reviewer: api.reviewer.clone().unwrap_or_default(),
        date: api.reviewdate.clone().unwrap_or_default(),
        stars: api
            .stars
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0),
    }
}

fn is_audio_file(name: &str) -> bool {
    name.rsplit('.')
        .next()
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn title_from_filename(name: &str) -> String {
    let stem = name.rsplit('/').next().unwrap_or(name);
    stem.rsplit_once('.')
        .map(|(base, _)| base)
        .unwrap_or(stem)
        .to_string()
}

/// Track lengths arrive either as `"mm:ss"` (sometimes `hh:mm:ss`) or as a
/// plain seconds float
fn parse_length(length: &str) -> Option<f64> {
    let length = length.trim();
    if length.is_empty() {
        return None;
    }

    if !length.contains(':') {
        return length.parse().ok();
    }

    let mut seconds = 0.0;
    for part in length.split(':') {
        seconds = seconds * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(seconds)
}
