//! Integration tests for the sync pipeline
//!
//! These cover the complete flow against a temporary SQLite database and
//! filesystem: show/recording import with referential-integrity resolution,
//! orchestrator short-circuits and resets, streaming download progress, and
//! remote discovery against a canned HTTP responder.

use std::path::Path;

use anyhow::Result;
use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tapevault::db::Database;
use tapevault::services::{
    ArchiveExtractor, Downloader, DownloadProgress, EntityImporter, ExtractedFile, RemoteArchive,
    RemoteFileLocator, SyncOrchestrator, SyncOutcome, SyncProgress, ZipEngine,
};

// ============================================================================
// Helpers
// ============================================================================

async fn test_db(dir: &Path) -> Database {
    Database::connect(&dir.join("test.db")).await.unwrap()
}

/// Write a JSON document under `root` and describe it as an extracted entry
async fn write_entry(root: &Path, relative: &str, contents: &str) -> ExtractedFile {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(&path, contents).await.unwrap();
    ExtractedFile {
        path,
        relative_path: relative.to_string(),
        is_directory: false,
        size: contents.len() as u64,
    }
}

fn show_json(id: &str, date: &str, recordings: &[&str]) -> String {
    let recordings = recordings
        .iter()
        .map(|r| format!("\"{r}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"{{
            "id": "{id}",
            "date": "{date}",
            "band": "Grateful Dead",
            "venue": "Barton Hall",
            "city": "Ithaca",
            "state": "NY",
            "recordings": [{recordings}],
            "avg_rating": 4.8
        }}"#
    )
}

/// One-shot HTTP responder; ignores the request path and serves `body`
async fn spawn_http_server(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

/// Engine that fakes extraction by writing a fixed set of JSON documents
struct FakeZipEngine {
    files: Vec<(String, String)>,
}

#[async_trait]
impl ZipEngine for FakeZipEngine {
    async fn extract_all(
        &self,
        _archive: &Path,
        output_dir: &Path,
        on_entry: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<Vec<ExtractedFile>> {
        let mut entries = Vec::new();
        for (index, (relative, contents)) in self.files.iter().enumerate() {
            let path = output_dir.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, contents).await?;
            entries.push(ExtractedFile {
                path,
                relative_path: relative.clone(),
                is_directory: false,
                size: contents.len() as u64,
            });
            on_entry(index + 1, self.files.len());
        }
        Ok(entries)
    }
}

fn orchestrator_with(
    db: Database,
    releases_url: &str,
    data_dir: &Path,
    engine: FakeZipEngine,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        db.clone(),
        RemoteFileLocator::new(releases_url.to_string()),
        Downloader::new(),
        ArchiveExtractor::new(Box::new(engine)),
        EntityImporter::new(db),
        data_dir.to_path_buf(),
    )
}

/// Unroutable base URL: discovery must fail fast, not hang
const DEAD_URL: &str = "http://127.0.0.1:1";

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn show_import_derives_year_and_year_month() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;
    let files = vec![
        write_entry(dir.path(), "shows/1977-05-08.json", &show_json("gd1977-05-08", "1977-05-08", &[])).await,
        write_entry(dir.path(), "shows/1972-11-17.json", &show_json("gd1972-11-17", "1972-11-17", &[])).await,
    ];

    let imported = EntityImporter::new(db.clone())
        .import_shows(&files, |_, _| {})
        .await
        .unwrap();
    assert_eq!(imported, 2);

    let shows = db.shows().await;
    let show = shows.get_by_id("gd1977-05-08").await.unwrap().unwrap();
    assert_eq!(show.year, 1977);
    assert_eq!(show.month, 5);
    assert_eq!(show.year_month, "1977-05");
    assert_eq!(show.venue, "Barton Hall");

    let show = shows.get_by_id("gd1972-11-17").await.unwrap().unwrap();
    assert_eq!(show.year_month, "1972-11");
}

#[tokio::test]
async fn malformed_show_file_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;
    let files = vec![
        write_entry(dir.path(), "shows/good.json", &show_json("gd1977-05-08", "1977-05-08", &[])).await,
        write_entry(dir.path(), "shows/bad.json", "{ this is not json").await,
    ];

    let imported = EntityImporter::new(db.clone())
        .import_shows(&files, |_, _| {})
        .await
        .unwrap();
    assert_eq!(imported, 1);
    assert_eq!(db.shows().await.count().await.unwrap(), 1);
}

#[tokio::test]
async fn search_finds_shows_by_date_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;
    let files = vec![
        write_entry(dir.path(), "shows/1977-05-08.json", &show_json("gd1977-05-08", "1977-05-08", &[])).await,
    ];

    EntityImporter::new(db.clone())
        .import_shows(&files, |_, _| {})
        .await
        .unwrap();

    let shows = db.shows().await;
    for query in ["5.8.77", "05-08-1977", "1977/5/8", "Barton", "Ithaca"] {
        let matches = shows.search(query, 10).await.unwrap();
        assert_eq!(matches.len(), 1, "query '{query}' should match");
    }
    assert!(shows.search("6/9/95", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn orphaned_recordings_are_never_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;
    let files = vec![
        write_entry(
            dir.path(),
            "shows/1977-05-08.json",
            &show_json("gd1977-05-08", "1977-05-08", &["gd77.sbd.hicks"]),
        )
        .await,
        write_entry(dir.path(), "recordings/gd77.sbd.hicks.json", r#"{"source_type": "soundboard"}"#).await,
        write_entry(dir.path(), "recordings/gd99.orphan.json", r#"{"source_type": "audience"}"#).await,
    ];

    let imported = EntityImporter::new(db.clone())
        .import_recordings(&files, |_, _| {})
        .await
        .unwrap();

    assert_eq!(imported, 1);
    let recordings = db.recordings().await;
    assert_eq!(recordings.count().await.unwrap(), 1);
    assert!(recordings.list_for_show("gd1977-05-08").await.unwrap()[0]
        .identifier
        .contains("gd77.sbd.hicks"));
}

#[tokio::test]
async fn recording_referenced_by_n_shows_yields_n_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;
    // The same tape covers both nights of a run in the source data
    let files = vec![
        write_entry(
            dir.path(),
            "shows/1970-02-13.json",
            &show_json("gd1970-02-13", "1970-02-13", &["gd70-02.sbd.early"]),
        )
        .await,
        write_entry(
            dir.path(),
            "shows/1970-02-14.json",
            &show_json("gd1970-02-14", "1970-02-14", &["gd70-02.sbd.early"]),
        )
        .await,
        write_entry(dir.path(), "recordings/gd70-02.sbd.early.json", r#"{"rating": 4.5}"#).await,
    ];

    let imported = EntityImporter::new(db.clone())
        .import_recordings(&files, |_, _| {})
        .await
        .unwrap();

    assert_eq!(imported, 2);
    let recordings = db.recordings().await;
    assert_eq!(recordings.list_for_show("gd1970-02-13").await.unwrap().len(), 1);
    assert_eq!(recordings.list_for_show("gd1970-02-14").await.unwrap().len(), 1);
}

#[tokio::test]
async fn import_batches_flush_past_batch_size() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;

    let mut files = Vec::new();
    for i in 0..120 {
        let id = format!("gd1977-05-{:02}x{i}", (i % 28) + 1);
        let date = format!("1977-05-{:02}", (i % 28) + 1);
        files.push(
            write_entry(dir.path(), &format!("shows/{id}.json"), &show_json(&id, &date, &[])).await,
        );
    }

    let mut progress_calls = 0usize;
    let imported = EntityImporter::new(db.clone())
        .import_shows(&files, |_, _| progress_calls += 1)
        .await
        .unwrap();

    assert_eq!(imported, 120);
    assert_eq!(progress_calls, 120, "progress is per file, not per batch");
    assert_eq!(db.shows().await.count().await.unwrap(), 120);
}

// ============================================================================
// Orchestrator
// ============================================================================

#[tokio::test]
async fn sync_short_circuits_when_data_already_exists() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;

    // Pre-populate both tables through the import path
    let files = vec![
        write_entry(
            dir.path(),
            "shows/1977-05-08.json",
            &show_json("gd1977-05-08", "1977-05-08", &["gd77.sbd.hicks"]),
        )
        .await,
        write_entry(dir.path(), "recordings/gd77.sbd.hicks.json", "{}").await,
    ];
    let importer = EntityImporter::new(db.clone());
    importer.import_shows(&files, |_, _| {}).await.unwrap();
    importer.import_recordings(&files, |_, _| {}).await.unwrap();

    // Discovery points at an unroutable endpoint: reaching the network at
    // all would surface an error instead of AlreadyExists
    let orchestrator = orchestrator_with(db, DEAD_URL, dir.path(), FakeZipEngine { files: vec![] });
    let outcome = orchestrator.sync_data().await.unwrap();
    assert_eq!(outcome, SyncOutcome::AlreadyExists);
}

#[tokio::test]
async fn sync_with_no_archive_anywhere_is_a_typed_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;
    let orchestrator = orchestrator_with(db, DEAD_URL, dir.path(), FakeZipEngine { files: vec![] });

    let result = orchestrator.sync_data().await;
    assert_matches!(result, Err(tapevault::services::SyncError::NoFileFound));
}

#[tokio::test]
async fn full_pipeline_from_local_archive() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    tokio::fs::create_dir_all(&data_dir).await.unwrap();
    // A previously downloaded archive; remote discovery will fail over to it
    tokio::fs::write(data_dir.join("data.zip"), b"archive bytes").await.unwrap();

    let db = test_db(dir.path()).await;
    let engine = FakeZipEngine {
        files: vec![
            (
                "shows/1977-05-08.json".to_string(),
                show_json("gd1977-05-08", "1977-05-08", &["gd77.sbd.hicks", "gd77.aud.vernon"]),
            ),
            (
                "recordings/gd77.sbd.hicks.json".to_string(),
                r#"{"source_type": "soundboard", "rating": 4.9}"#.to_string(),
            ),
            (
                "recordings/gd77.aud.vernon.json".to_string(),
                r#"{"source_type": "audience", "rating": 4.1}"#.to_string(),
            ),
            (
                "recordings/gd00.unreferenced.json".to_string(),
                r#"{"source_type": "audience"}"#.to_string(),
            ),
        ],
    };

    let orchestrator = orchestrator_with(db.clone(), DEAD_URL, &data_dir, engine);
    let mut progress = orchestrator.subscribe();

    let outcome = orchestrator.sync_data().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Completed { shows: 1, recordings: 2 });

    assert_eq!(db.shows().await.count().await.unwrap(), 1);
    assert_eq!(db.recordings().await.count().await.unwrap(), 2);

    // Working directory is cleaned up; the archive stays
    assert!(!data_dir.join("extracted").exists());
    assert!(data_dir.join("data.zip").exists());

    // Progress stream saw each phase and ended Idle
    let mut events = Vec::new();
    while let Ok(event) = progress.try_recv() {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(e, SyncProgress::Extracting { .. })));
    assert!(events.iter().any(|e| matches!(e, SyncProgress::ImportingShows { .. })));
    assert!(events.iter().any(|e| matches!(e, SyncProgress::ImportingRecordings { .. })));
    assert_eq!(events.last(), Some(&SyncProgress::Idle));

    // A second sync is a no-op
    let outcome = orchestrator.sync_data().await.unwrap();
    assert_eq!(outcome, SyncOutcome::AlreadyExists);
}

#[tokio::test]
async fn clear_all_data_resets_storage_and_reports_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;

    let files = vec![
        write_entry(dir.path(), "shows/1977-05-08.json", &show_json("gd1977-05-08", "1977-05-08", &[])).await,
    ];
    EntityImporter::new(db.clone()).import_shows(&files, |_, _| {}).await.unwrap();
    assert_eq!(db.shows().await.count().await.unwrap(), 1);

    let orchestrator = orchestrator_with(db.clone(), DEAD_URL, dir.path(), FakeZipEngine { files: vec![] });
    let outcome = orchestrator.clear_all_data().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Cleared);

    // Schema is back and empty; clones of the database keep working
    assert_eq!(db.shows().await.count().await.unwrap(), 0);
    assert_eq!(db.recordings().await.count().await.unwrap(), 0);
}

#[tokio::test]
async fn library_membership_survives_as_the_only_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(dir.path()).await;

    let files = vec![
        write_entry(dir.path(), "shows/1977-05-08.json", &show_json("gd1977-05-08", "1977-05-08", &[])).await,
    ];
    EntityImporter::new(db.clone()).import_shows(&files, |_, _| {}).await.unwrap();

    let shows = db.shows().await;
    assert!(shows.set_in_library("gd1977-05-08", true).await.unwrap());
    assert!(shows.get_by_id("gd1977-05-08").await.unwrap().unwrap().in_library);
    assert!(!shows.set_in_library("missing", true).await.unwrap());
}

// ============================================================================
// Discovery and download
// ============================================================================

#[tokio::test]
async fn remote_discovery_selects_the_data_archive_asset() {
    let release = r#"{
        "tag_name": "2024-06",
        "assets": [
            {"name": "checksums.txt", "browser_download_url": "http://x/c.txt", "size": 100},
            {"name": "data-2024-06.zip", "browser_download_url": "http://x/data.zip", "size": 123456}
        ]
    }"#;
    let base = spawn_http_server(release.as_bytes().to_vec()).await;

    let dir = tempfile::tempdir().unwrap();
    let locator = RemoteFileLocator::new(base);
    let discovered = locator.discover(dir.path()).await;

    assert!(discovered.local.is_none());
    let remote = discovered.remote.expect("remote asset should be found");
    assert_eq!(remote.name, "data-2024-06.zip");
    assert_eq!(remote.size, 123456);
    assert_eq!(remote.tag, "2024-06");
}

#[tokio::test]
async fn discovery_is_best_effort_on_network_failure() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("data.zip"), b"old archive").await.unwrap();

    let locator = RemoteFileLocator::new(DEAD_URL.to_string());
    let discovered = locator.discover(dir.path()).await;

    assert!(discovered.remote.is_none(), "network failure collapses to None");
    let local = discovered.local.expect("local side is independent");
    assert_eq!(local.size, 11);
}

#[tokio::test]
async fn download_progress_is_monotone_and_ends_at_content_length() {
    let body: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
    let total = body.len() as u64;
    let base = spawn_http_server(body).await;

    let dir = tempfile::tempdir().unwrap();
    let remote = RemoteArchive {
        name: "data.zip".to_string(),
        url: format!("{base}/data.zip"),
        size: 1, // wrong on purpose; the declared content length must win
        tag: "test".to_string(),
    };

    let mut events = Vec::new();
    let downloader = Downloader::new();
    let path = downloader
        .download(&remote, dir.path(), |p| events.push(p))
        .await
        .unwrap();

    assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), total);

    assert_matches!(events.first(), Some(DownloadProgress::Started { total: t }) if *t == total);
    assert_matches!(events.last(), Some(DownloadProgress::Done { bytes }) if *bytes == total);

    let mut last = 0u64;
    let mut final_chunk = 0u64;
    for event in &events {
        if let DownloadProgress::Chunk { bytes_so_far, total: t } = event {
            assert!(*bytes_so_far >= last, "progress must be non-decreasing");
            assert_eq!(*t, total);
            last = *bytes_so_far;
            final_chunk = *bytes_so_far;
        }
    }
    assert_eq!(final_chunk, total);
}

#[tokio::test]
async fn downloaded_asset_is_discoverable_as_the_local_copy() {
    let body = b"dated release asset".to_vec();
    let base = spawn_http_server(body.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    // Asset names carry the release tag; the local copy must not
    let remote = RemoteArchive {
        name: "data-2024-06.zip".to_string(),
        url: format!("{base}/data-2024-06.zip"),
        size: body.len() as u64,
        tag: "2024-06".to_string(),
    };

    let path = Downloader::new()
        .download(&remote, dir.path(), |_| {})
        .await
        .unwrap();
    assert_eq!(path.file_name().unwrap(), "data.zip");

    let locator = RemoteFileLocator::new(DEAD_URL.to_string());
    let discovered = locator.discover(dir.path()).await;
    let local = discovered
        .local
        .expect("downloaded archive is the offline fallback candidate");
    assert_eq!(local.path, path);
    assert_eq!(local.size, body.len() as u64);
}

#[tokio::test]
async fn download_replaces_stale_destination_file() {
    let body = b"fresh archive contents".to_vec();
    let base = spawn_http_server(body.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("data.zip"), b"stale, much longer than the fresh one")
        .await
        .unwrap();

    let remote = RemoteArchive {
        name: "data.zip".to_string(),
        url: format!("{base}/data.zip"),
        size: body.len() as u64,
        tag: "test".to_string(),
    };

    let path = Downloader::new()
        .download(&remote, dir.path(), |_| {})
        .await
        .unwrap();

    let written = tokio::fs::read(&path).await.unwrap();
    assert_eq!(written, body);
}
