//! JSON-to-entity import with batched persistence
//!
//! Parses extracted show and recording documents, resolves the
//! recording-to-show references, and persists validated records in
//! fixed-size transactional batches. A malformed document is logged and
//! skipped; it never aborts the batch or the import as a whole.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::db::{Database, RecordingRecord, ShowRecord};

use super::extractor::ExtractedFile;
use super::search_text::search_text_for_show;

/// Shows are persisted in transactions of this many rows
pub const SHOW_BATCH_SIZE: usize = 50;

/// Recordings are persisted in transactions of this many rows
pub const RECORDING_BATCH_SIZE: usize = 100;

/// Valid year range for a show date
const YEAR_MIN: i32 = 1960;
const YEAR_MAX: i32 = 2030;

/// Show document as published in the archive. Tolerant: unknown fields are
/// ignored and everything beyond id/date is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct ShowDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub date: String,
    pub band: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub url: Option<String>,
    pub setlist: Option<SetlistDocument>,
    pub lineup: Option<LineupDocument>,
    #[serde(default)]
    pub recordings: Vec<String>,
    pub best_recording: Option<String>,
    pub avg_rating: Option<f64>,
    pub review_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetlistDocument {
    #[serde(default)]
    pub sets: Vec<SetDocument>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDocument {
    #[serde(default)]
    pub songs: Vec<SongDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongDocument {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineupDocument {
    #[serde(default)]
    pub members: Vec<MemberDocument>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberDocument {
    pub name: Option<String>,
}

/// Recording document as published in the archive. The identifier comes from
/// the filename, not from any in-file field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingDocument {
    pub source_type: Option<String>,
    pub rating: Option<f64>,
    pub raw_rating: Option<f64>,
    pub review_count: Option<i64>,
    pub confidence: Option<f64>,
    pub high_ratings: Option<i64>,
    pub low_ratings: Option<i64>,
    pub taper: Option<String>,
    pub source: Option<String>,
    pub lineage: Option<String>,
}

impl ShowDocument {
    fn member_names(&self) -> Vec<String> {
        self.lineup
            .iter()
            .flat_map(|l| &l.members)
            .filter_map(|m| m.name.clone())
            .filter(|n| !n.trim().is_empty())
            .collect()
    }

    fn song_names(&self) -> Vec<String> {
        self.setlist
            .iter()
            .flat_map(|s| &s.sets)
            .flat_map(|s| &s.songs)
            .filter_map(|s| s.name.clone())
            .filter(|n| !n.trim().is_empty())
            .collect()
    }
}

pub struct EntityImporter {
    db: Database,
}

impl EntityImporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Import all show documents from the extracted files.
    ///
    /// Progress is reported per file processed, not per batch. Returns the
    /// number of shows persisted.
    pub async fn import_shows<F>(&self, files: &[ExtractedFile], mut on_progress: F) -> Result<usize>
    where
        F: FnMut(usize, usize),
    {
        let show_files: Vec<&ExtractedFile> = files.iter().filter(|f| is_show_file(f)).collect();
        let total = show_files.len();

        let repository = self.db.shows().await;
        let mut batch: Vec<(ShowRecord, String)> = Vec::with_capacity(SHOW_BATCH_SIZE);
        let mut imported = 0usize;

        for (index, file) in show_files.iter().enumerate() {
            match parse_show_file(file).await {
                Ok(document) => {
                    let members = document.member_names();
                    let songs = document.song_names();
                    let record = map_show(&document);
                    if let Err(reason) = validate_show(&record) {
                        warn!(file = %file.relative_path, reason, "Skipping invalid show");
                    } else {
                        let search_text = search_text_for_show(&record, &members, &songs);
                        batch.push((record, search_text));
                    }
                }
                Err(e) => {
                    warn!(file = %file.relative_path, error = %e, "Skipping malformed show file");
                }
            }

            if batch.len() >= SHOW_BATCH_SIZE {
                repository
                    .insert_batch(&batch)
                    .await
                    .context("Failed to persist show batch")?;
                imported += batch.len();
                batch.clear();
            }

            on_progress(index + 1, total);
        }

        if !batch.is_empty() {
            repository
                .insert_batch(&batch)
                .await
                .context("Failed to persist show batch")?;
            imported += batch.len();
        }

        debug!(imported, total_files = total, "Show import finished");
        Ok(imported)
    }

    /// Import all recording documents from the extracted files.
    ///
    /// Two passes: first every show document is materialized into a map of
    /// show id to its embedded recording identifier list, then every
    /// recording document is joined against that map. A recording referenced
    /// by N shows yields N records; a recording referenced by none is an
    /// orphan and is dropped, never persisted.
    pub async fn import_recordings<F>(
        &self,
        files: &[ExtractedFile],
        mut on_progress: F,
    ) -> Result<usize>
    where
        F: FnMut(usize, usize),
    {
        // Pass 1: show id -> embedded recording identifiers
        let mut show_recordings: HashMap<String, Vec<String>> = HashMap::new();
        for file in files.iter().filter(|f| is_show_file(f)) {
            match parse_show_file(file).await {
                Ok(document) if !document.id.trim().is_empty() => {
                    show_recordings.insert(document.id.clone(), document.recordings);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(file = %file.relative_path, error = %e, "Skipping malformed show file");
                }
            }
        }

        // Pass 2: recording identifier (from the filename stem) -> document
        let mut recording_docs: HashMap<String, RecordingDocument> = HashMap::new();
        for file in files.iter().filter(|f| is_recording_file(f)) {
            let Some(identifier) = file_stem(&file.relative_path) else {
                continue;
            };
            match parse_recording_file(file).await {
                Ok(document) => {
                    recording_docs.insert(identifier, document);
                }
                Err(e) => {
                    warn!(
                        file = %file.relative_path,
                        error = %e,
                        "Skipping malformed recording file"
                    );
                }
            }
        }

        let total = recording_docs.len();
        let repository = self.db.recordings().await;
        let mut batch: Vec<RecordingRecord> = Vec::with_capacity(RECORDING_BATCH_SIZE);
        let mut imported = 0usize;
        let mut orphans = 0usize;
        let mut processed = 0usize;

        for (identifier, document) in &recording_docs {
            let referencing: Vec<&String> = show_recordings
                .iter()
                .filter(|(_, ids)| ids.iter().any(|id| id == identifier))
                .map(|(show_id, _)| show_id)
                .collect();

            if referencing.is_empty() {
                orphans += 1;
            }

            for show_id in referencing {
                batch.push(map_recording(identifier, show_id, document));
                if batch.len() >= RECORDING_BATCH_SIZE {
                    repository
                        .insert_batch(&batch)
                        .await
                        .context("Failed to persist recording batch")?;
                    imported += batch.len();
                    batch.clear();
                }
            }

            processed += 1;
            on_progress(processed, total);
        }

        if !batch.is_empty() {
            repository
                .insert_batch(&batch)
                .await
                .context("Failed to persist recording batch")?;
            imported += batch.len();
        }

        if orphans > 0 {
            warn!(
                orphans,
                "Recordings not referenced by any show were dropped"
            );
        }

        debug!(imported, orphans, "Recording import finished");
        Ok(imported)
    }
}

fn is_show_file(file: &ExtractedFile) -> bool {
    !file.is_directory
        && file.relative_path.contains("shows/")
        && file.relative_path.ends_with(".json")
}

fn is_recording_file(file: &ExtractedFile) -> bool {
    !file.is_directory
        && file.relative_path.contains("recordings/")
        && file.relative_path.ends_with(".json")
}

/// Identifier of a recording file: the filename without the .json extension
fn file_stem(relative_path: &str) -> Option<String> {
    let name = relative_path.rsplit('/').next()?;
    Some(name.strip_suffix(".json").unwrap_or(name).to_string())
}

async fn parse_show_file(file: &ExtractedFile) -> Result<ShowDocument> {
    let contents = tokio::fs::read_to_string(&file.path)
        .await
        .with_context(|| format!("Failed to read {}", file.path.display()))?;
    serde_json::from_str(&contents).context("Invalid show JSON")
}

async fn parse_recording_file(file: &ExtractedFile) -> Result<RecordingDocument> {
    let contents = tokio::fs::read_to_string(&file.path)
        .await
        .with_context(|| format!("Failed to read {}", file.path.display()))?;
    serde_json::from_str(&contents).context("Invalid recording JSON")
}

/// Map a show document into a record, deriving year/month from the date.
/// An unparseable date falls back to epoch year/month.
fn map_show(document: &ShowDocument) -> ShowRecord {
    let (year, month) = match NaiveDate::parse_from_str(&document.date, "%Y-%m-%d") {
        Ok(parsed) => (parsed.year(), parsed.month() as i32),
        Err(_) => (1970, 1),
    };

    let city = document.city.clone().unwrap_or_default();
    let state = document.state.clone().unwrap_or_default();
    let location_raw = match (city.is_empty(), state.is_empty()) {
        (false, false) => format!("{city}, {state}"),
        (false, true) => city.clone(),
        (true, false) => state.clone(),
        (true, true) => document.country.clone().unwrap_or_default(),
    };

    let setlist_raw = document.song_names().join("; ");
    let lineup_raw = document.member_names().join(", ");
    let now = Utc::now();

    ShowRecord {
        id: document.id.clone(),
        date: document.date.clone(),
        year,
        month,
        year_month: format!("{year}-{month:02}"),
        band: document.band.clone().unwrap_or_default(),
        venue: document.venue.clone().unwrap_or_default(),
        city,
        state,
        country: document.country.clone().unwrap_or_default(),
        location_raw,
        setlist_raw,
        setlist_status: document
            .setlist
            .as_ref()
            .and_then(|s| s.status.clone())
            .unwrap_or_default(),
        lineup_raw,
        lineup_status: document
            .lineup
            .as_ref()
            .and_then(|l| l.status.clone())
            .unwrap_or_default(),
        recording_count: document.recordings.len() as i64,
        best_recording_id: document.best_recording.clone(),
        avg_rating: document.avg_rating.unwrap_or(0.0),
        review_count: document.review_count.unwrap_or(0),
        in_library: false,
        created_at: now,
        updated_at: now,
    }
}

fn map_recording(identifier: &str, show_id: &str, document: &RecordingDocument) -> RecordingRecord {
    RecordingRecord {
        identifier: identifier.to_string(),
        show_id: show_id.to_string(),
        source_type: document.source_type.clone().unwrap_or_default(),
        rating: document.rating.unwrap_or(0.0),
        raw_rating: document.raw_rating.unwrap_or(0.0),
        review_count: document.review_count.unwrap_or(0),
        confidence: document.confidence.unwrap_or(0.0),
        high_ratings: document.high_ratings.unwrap_or(0),
        low_ratings: document.low_ratings.unwrap_or(0),
        taper: document.taper.clone().unwrap_or_default(),
        source: document.source.clone().unwrap_or_default(),
        lineage: document.lineage.clone().unwrap_or_default(),
        collected_at: Utc::now(),
    }
}

fn validate_show(record: &ShowRecord) -> std::result::Result<(), &'static str> {
    if record.id.trim().is_empty() {
        return Err("blank id");
    }
    if record.date.trim().is_empty() {
        return Err("blank date");
    }
    if record.year <= YEAR_MIN || record.year >= YEAR_MAX {
        return Err("year out of range");
    }
    Ok(())
}
