//! Sync orchestration: Locate -> Download -> Extract -> Import -> Cleanup
//!
//! Phases run strictly in sequence within one logical task. Progress is
//! published on a broadcast channel; any phase failure resets progress to
//! `Idle` and surfaces a typed error. Batches already committed by the
//! importer are never rolled back.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::db::Database;

use super::downloader::{DownloadProgress, Downloader};
use super::extractor::ArchiveExtractor;
use super::importer::EntityImporter;
use super::locator::{LOCAL_ARCHIVE_NAME, RemoteFileLocator};

/// Subdirectory of the data dir where archives are extracted
const EXTRACT_DIR_NAME: &str = "extracted";

/// Progress states published while a sync is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProgress {
    Idle,
    Downloading { bytes: u64, total: u64 },
    Extracting { current: usize, total: usize },
    ImportingShows { current: usize, total: usize },
    ImportingRecordings { current: usize, total: usize },
    Clearing,
}

/// Terminal result of a sync operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Both tables were already populated; nothing was touched
    AlreadyExists,
    Completed { shows: usize, recordings: usize },
    Cleared,
}

/// Failure taxonomy surfaced to the caller. Nothing here is fatal to the
/// host process: every variant is recoverable by retrying the sync or
/// clearing all data first.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no data archive found locally or remotely")]
    NoFileFound,
    #[error("download failed: {0}")]
    Download(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("import failed: {0}")]
    Import(String),
    #[error("database schema out of date; clear all data and sync again")]
    SchemaMismatch,
}

pub struct SyncOrchestrator {
    db: Database,
    locator: RemoteFileLocator,
    downloader: Downloader,
    extractor: ArchiveExtractor,
    importer: EntityImporter,
    data_dir: PathBuf,
    progress_tx: broadcast::Sender<SyncProgress>,
}

impl SyncOrchestrator {
    pub fn new(
        db: Database,
        locator: RemoteFileLocator,
        downloader: Downloader,
        extractor: ArchiveExtractor,
        importer: EntityImporter,
        data_dir: PathBuf,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            db,
            locator,
            downloader,
            extractor,
            importer,
            data_dir,
            progress_tx,
        }
    }

    /// Subscribe to progress events for the lifetime of this orchestrator
    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    /// Run the full pipeline unless data is already present.
    ///
    /// Short-circuits to [`SyncOutcome::AlreadyExists`] when both the show
    /// and recording tables are non-empty, touching neither network nor
    /// disk. Concurrent calls are not mutually excluded here; callers are
    /// expected to keep at most one sync in flight.
    pub async fn sync_data(&self) -> Result<SyncOutcome, SyncError> {
        let show_count = self.db.shows().await.count().await.map_err(map_db_error)?;
        let recording_count = self
            .db
            .recordings()
            .await
            .count()
            .await
            .map_err(map_db_error)?;

        if show_count > 0 && recording_count > 0 {
            info!(show_count, recording_count, "Data already present; skipping sync");
            return Ok(SyncOutcome::AlreadyExists);
        }

        let result = self.run_pipeline().await;
        self.publish(SyncProgress::Idle);
        result
    }

    /// Clear all persisted data and the downloaded archive, then sync fresh
    pub async fn force_refresh_data(&self) -> Result<SyncOutcome, SyncError> {
        info!("Force refresh requested");
        self.publish(SyncProgress::Clearing);

        let cleared = async {
            self.db.recordings().await.delete_all().await?;
            self.db.shows().await.delete_all().await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        if let Err(e) = cleared {
            self.publish(SyncProgress::Idle);
            return Err(map_db_error(e));
        }

        let archive = self.data_dir.join(LOCAL_ARCHIVE_NAME);
        if let Err(e) = self.downloader.delete_local_file(&archive).await {
            // Not fatal; a stale archive is overwritten by the next download
            warn!(error = %e, "Could not delete cached archive");
        }

        self.sync_data().await
    }

    /// Reset the underlying storage entirely, schema included.
    ///
    /// Best-effort by design: even when the database file cannot be removed
    /// the reset falls back to clearing tables and still reports `Cleared`.
    /// This is the recovery path for schema mismatches.
    pub async fn clear_all_data(&self) -> Result<SyncOutcome, SyncError> {
        self.publish(SyncProgress::Clearing);
        let result = self.db.reset().await;
        self.publish(SyncProgress::Idle);

        result.map_err(map_db_error)?;
        Ok(SyncOutcome::Cleared)
    }

    async fn run_pipeline(&self) -> Result<SyncOutcome, SyncError> {
        // Locate
        let discovered = self.locator.discover(&self.data_dir).await;

        // Download, or fall back to a previously downloaded archive
        let archive_path = if let Some(remote) = discovered.remote {
            let tx = self.progress_tx.clone();
            self.downloader
                .download(&remote, &self.data_dir, move |progress| {
                    let event = match progress {
                        DownloadProgress::Started { total } => {
                            SyncProgress::Downloading { bytes: 0, total }
                        }
                        DownloadProgress::Chunk { bytes_so_far, total } => {
                            SyncProgress::Downloading { bytes: bytes_so_far, total }
                        }
                        DownloadProgress::Done { bytes } => {
                            SyncProgress::Downloading { bytes, total: bytes }
                        }
                        DownloadProgress::Failed { .. } => SyncProgress::Idle,
                    };
                    let _ = tx.send(event);
                })
                .await
                .map_err(|e| SyncError::Download(format!("{e:#}")))?
        } else if let Some(local) = discovered.local {
            info!(path = %local.path.display(), "No remote archive; using local copy");
            local.path
        } else {
            return Err(SyncError::NoFileFound);
        };

        // Extract
        let extract_dir = self.data_dir.join(EXTRACT_DIR_NAME);
        let tx = self.progress_tx.clone();
        let files = self
            .extractor
            .extract_all(&archive_path, &extract_dir, move |p| {
                let _ = tx.send(SyncProgress::Extracting {
                    current: p.current,
                    total: p.total,
                });
            })
            .await
            .map_err(|e| SyncError::Extraction(format!("{e:#}")))?;

        // Import shows, then recordings
        let tx = self.progress_tx.clone();
        let shows = self
            .importer
            .import_shows(&files, move |current, total| {
                let _ = tx.send(SyncProgress::ImportingShows { current, total });
            })
            .await
            .map_err(map_db_error)?;

        let tx = self.progress_tx.clone();
        let recordings = self
            .importer
            .import_recordings(&files, move |current, total| {
                let _ = tx.send(SyncProgress::ImportingRecordings { current, total });
            })
            .await
            .map_err(map_db_error)?;

        // Cleanup the working directory; the downloaded archive stays for
        // offline re-import
        if let Err(e) = self.extractor.cleanup(&extract_dir).await {
            warn!(error = %e, "Extraction cleanup failed");
        }

        info!(shows, recordings, "Sync complete");
        Ok(SyncOutcome::Completed { shows, recordings })
    }

    fn publish(&self, progress: SyncProgress) {
        let _ = self.progress_tx.send(progress);
    }
}

/// Distinguish a schema mismatch from other persistence failures so the
/// caller can be told to perform a full reset
fn map_db_error(e: anyhow::Error) -> SyncError {
    let message = format!("{e:#}");
    let lowered = message.to_lowercase();
    if lowered.contains("no such table") || lowered.contains("no such column") {
        SyncError::SchemaMismatch
    } else {
        SyncError::Import(message)
    }
}
