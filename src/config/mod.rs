//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::Result;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file path
    pub database_path: PathBuf,

    /// Working directory for downloaded archives and extraction
    pub data_dir: PathBuf,

    /// Directory for the expiring per-recording metadata cache
    pub cache_dir: PathBuf,

    /// Base URL of the releases API publishing the data archive
    pub releases_base_url: String,

    /// Base URL of the per-recording metadata API
    pub metadata_base_url: String,
}

/// Default releases endpoint for the published data archive
const DEFAULT_RELEASES_URL: &str = "https://api.github.com/repos/deadly-apps/data";

/// Default per-recording metadata endpoint (Archive.org item details)
const DEFAULT_METADATA_URL: &str = "https://archive.org/metadata";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let base_dir = env::var("TAPEVAULT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_base_dir());

        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join("tapevault.db"));

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join("data"));

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join("cache"));

        Ok(Self {
            database_path,
            data_dir,
            cache_dir,

            releases_base_url: env::var("RELEASES_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_RELEASES_URL.to_string()),

            metadata_base_url: env::var("METADATA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_METADATA_URL.to_string()),
        })
    }
}

/// Default base directory under the platform data dir, falling back to ./data
fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tapevault"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
