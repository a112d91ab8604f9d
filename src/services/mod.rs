//! Sync pipeline and external service integrations

pub mod archive_api;
pub mod cache;
pub mod downloader;
pub mod extractor;
pub mod importer;
pub mod locator;
pub mod search_text;
pub mod sync;

pub use archive_api::{RecordingDetails, RecordingMetadata, RemoteMetadataClient, Review, Track};
pub use cache::{CacheCategory, ExpiringFileCache};
pub use downloader::{DownloadProgress, Downloader};
pub use extractor::{ArchiveExtractor, CommandZipEngine, ExtractProgress, ExtractedFile, ZipEngine};
pub use importer::{EntityImporter, RecordingDocument, ShowDocument};
pub use locator::{DiscoveredFiles, LocalArchive, RemoteArchive, RemoteFileLocator};
pub use search_text::{date_permutations, search_text_for_show};
pub use sync::{SyncError, SyncOrchestrator, SyncOutcome, SyncProgress};
