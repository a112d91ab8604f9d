//! Database connection and operations

pub mod recordings;
pub mod shows;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub use recordings::{RecordingRecord, RecordingRepository};
pub use shows::{ShowRecord, ShowRepository};

/// Idempotent schema definition. The archive is the source of truth, so the
/// schema carries no migrations; a mismatch is recovered by a full reset.
const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS shows (
        id TEXT PRIMARY KEY,
        date TEXT NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        year_month TEXT NOT NULL,
        band TEXT NOT NULL,
        venue TEXT NOT NULL,
        city TEXT NOT NULL,
        state TEXT NOT NULL,
        country TEXT NOT NULL,
        location_raw TEXT NOT NULL,
        setlist_raw TEXT NOT NULL,
        setlist_status TEXT NOT NULL,
        lineup_raw TEXT NOT NULL,
        lineup_status TEXT NOT NULL,
        recording_count INTEGER NOT NULL DEFAULT 0,
        best_recording_id TEXT,
        avg_rating REAL NOT NULL DEFAULT 0,
        review_count INTEGER NOT NULL DEFAULT 0,
        in_library INTEGER NOT NULL DEFAULT 0,
        search_text TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS recordings (
        identifier TEXT NOT NULL,
        show_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        rating REAL NOT NULL DEFAULT 0,
        raw_rating REAL NOT NULL DEFAULT 0,
        review_count INTEGER NOT NULL DEFAULT 0,
        confidence REAL NOT NULL DEFAULT 0,
        high_ratings INTEGER NOT NULL DEFAULT 0,
        low_ratings INTEGER NOT NULL DEFAULT 0,
        taper TEXT NOT NULL DEFAULT '',
        source TEXT NOT NULL DEFAULT '',
        lineage TEXT NOT NULL DEFAULT '',
        collected_at TEXT NOT NULL,
        PRIMARY KEY (identifier, show_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_recordings_show_id ON recordings(show_id)",
    "CREATE INDEX IF NOT EXISTS idx_shows_year_month ON shows(year_month)",
];

/// Database wrapper providing connection pool access.
///
/// The pool lives behind a lock so that a full reset can close it, remove the
/// underlying file, and swap in a fresh pool while clones stay valid.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
    pool: Arc<RwLock<SqlitePool>>,
}

impl Database {
    /// Open (creating if missing) the database at `path` and initialize the schema
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let pool = open_pool(path).await?;
        init_schema(&pool).await?;

        Ok(Self {
            path: path.to_path_buf(),
            pool: Arc::new(RwLock::new(pool)),
        })
    }

    /// Get a clone of the current connection pool
    pub async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Get a show repository
    pub async fn shows(&self) -> ShowRepository {
        ShowRepository::new(self.pool().await)
    }

    /// Get a recording repository
    pub async fn recordings(&self) -> RecordingRepository {
        RecordingRepository::new(self.pool().await)
    }

    /// Destroy and recreate the underlying storage, schema included.
    ///
    /// Best-effort: if the database file cannot be removed (e.g. still held
    /// open elsewhere) this falls back to clearing both tables and still
    /// reports success. Only a failure to reopen the pool is an error.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.pool.write().await;
        guard.close().await;

        let removed = remove_database_files(&self.path).await;
        *guard = reopen(&self.path, removed).await?;

        info!("Database reset complete");
        Ok(())
    }
}

/// Remove the database file and its WAL companions. Returns whether the main
/// file is gone; companion-file failures are only logged.
async fn remove_database_files(path: &Path) -> bool {
    let mut removed = true;
    for suffix in ["", "-wal", "-shm"] {
        let file = PathBuf::from(format!("{}{}", path.display(), suffix));
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Could not remove database file");
                if suffix.is_empty() {
                    removed = false;
                }
            }
        }
    }
    removed
}

/// Open a fresh pool after a reset. When the old file survived the removal,
/// both tables are wiped in place instead; only a failure to reopen is an
/// error.
async fn reopen(path: &Path, removed: bool) -> Result<SqlitePool> {
    let pool = open_pool(path).await?;
    init_schema(&pool).await?;

    if !removed {
        sqlx::query("DELETE FROM recordings").execute(&pool).await.ok();
        sqlx::query("DELETE FROM shows").execute(&pool).await.ok();
        warn!("Database file could not be removed; cleared tables instead");
    }

    Ok(pool)
}

async fn open_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;

    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA_SQL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to initialize database schema")?;
    }
    Ok(())
}
