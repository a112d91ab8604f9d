//! Expiring file cache for per-recording metadata
//!
//! One JSON blob per (key, category) unit, named `{key}.{category}.json`
//! inside a fixed cache directory. The filesystem last-modified time is the
//! expiry clock. Every operation is best-effort: the cache is an
//! optimization, never a correctness dependency, so I/O failures are logged
//! and swallowed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Fixed TTL: a unit older than one week is treated as absent
pub const CACHE_TTL: Duration = Duration::from_secs(168 * 60 * 60);

/// Cache unit category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Metadata,
    Tracks,
    Reviews,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 3] = [
        CacheCategory::Metadata,
        CacheCategory::Tracks,
        CacheCategory::Reviews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Metadata => "metadata",
            CacheCategory::Tracks => "tracks",
            CacheCategory::Reviews => "reviews",
        }
    }
}

pub struct ExpiringFileCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl ExpiringFileCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            ttl: CACHE_TTL,
        }
    }

    /// Override the TTL; used by tests to force expiry
    pub fn with_ttl(cache_dir: PathBuf, ttl: Duration) -> Self {
        Self { cache_dir, ttl }
    }

    /// Read a cached unit. Returns `None` (not an error) for a missing or
    /// expired unit; a stale unit is purged as a side effect.
    pub async fn get(&self, key: &str, category: CacheCategory) -> Option<String> {
        let path = self.unit_path(key, category);

        if self.is_expired(key, category).await {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(path = %path.display(), "Purging expired cache unit");
                let _ = tokio::fs::remove_file(&path).await;
            }
            return None;
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Some(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Write a unit, overwriting any existing one. Failures are swallowed.
    pub async fn put(&self, key: &str, category: CacheCategory, data: &str) {
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            warn!(dir = %self.cache_dir.display(), error = %e, "Cache dir create failed");
            return;
        }

        let path = self.unit_path(key, category);
        if let Err(e) = tokio::fs::write(&path, data).await {
            warn!(path = %path.display(), error = %e, "Cache write failed");
        }
    }

    /// Whether a unit is missing or older than the TTL
    pub async fn is_expired(&self, key: &str, category: CacheCategory) -> bool {
        let path = self.unit_path(key, category);
        age_of(&path)
            .await
            .map(|age| age > self.ttl)
            .unwrap_or(true)
    }

    /// Remove cached units: one unit, all categories of one key, one category
    /// across all keys, or everything
    pub async fn clear(&self, key: Option<&str>, category: Option<CacheCategory>) {
        match (key, category) {
            (Some(key), Some(category)) => {
                let _ = tokio::fs::remove_file(self.unit_path(key, category)).await;
            }
            (Some(key), None) => {
                for category in CacheCategory::ALL {
                    let _ = tokio::fs::remove_file(self.unit_path(key, category)).await;
                }
            }
            (None, category) => {
                let suffix = category.map(|c| format!(".{}.json", c.as_str()));
                let Ok(mut entries) = tokio::fs::read_dir(&self.cache_dir).await else {
                    return;
                };
                while let Ok(Some(entry)) = entries.next_entry().await {
                    if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                        continue;
                    }
                    if let Some(suffix) = &suffix {
                        if !entry.file_name().to_string_lossy().ends_with(suffix.as_str()) {
                            continue;
                        }
                    }
                    let _ = tokio::fs::remove_file(entry.path()).await;
                }
            }
        }
    }

    fn unit_path(&self, key: &str, category: CacheCategory) -> PathBuf {
        self.cache_dir
            .join(format!("{key}.{}.json", category.as_str()))
    }
}

/// Age of a file measured against its last-modified time
async fn age_of(path: &Path) -> Option<Duration> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let modified = metadata.modified().ok()?;
    std::time::SystemTime::now().duration_since(modified).ok()
}
