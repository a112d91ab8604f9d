//! Remote file discovery for the published data archive
//!
//! The archive is published as a release asset on a GitHub-style releases
//! API. Discovery looks up the latest release and the well-known local path
//! of any previously downloaded copy; both sides are independently
//! best-effort and collapse to `None` on error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

/// Well-known filename for the downloaded archive
pub const LOCAL_ARCHIVE_NAME: &str = "data.zip";

/// A previously downloaded archive on local disk
#[derive(Debug, Clone)]
pub struct LocalArchive {
    pub path: PathBuf,
    pub size: u64,
}

/// The latest published archive asset
#[derive(Debug, Clone)]
pub struct RemoteArchive {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub tag: String,
}

/// Result of discovery; either side may be absent
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    pub local: Option<LocalArchive>,
    pub remote: Option<RemoteArchive>,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
    size: u64,
}

pub struct RemoteFileLocator {
    client: reqwest::Client,
    releases_base_url: String,
}

impl RemoteFileLocator {
    pub fn new(releases_base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            releases_base_url,
        }
    }

    /// Find the latest published archive and any previously downloaded copy.
    ///
    /// Neither lookup aborts the other: a disk error or network error is
    /// logged and yields `None` for that side. The caller decides whether
    /// absence is fatal. No retry at this layer.
    pub async fn discover(&self, local_dir: &Path) -> DiscoveredFiles {
        let local = match self.find_local(local_dir).await {
            Ok(local) => local,
            Err(e) => {
                warn!(error = %e, "Local archive lookup failed");
                None
            }
        };

        let remote = match self.find_remote().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Remote archive lookup failed");
                None
            }
        };

        DiscoveredFiles { local, remote }
    }

    async fn find_local(&self, local_dir: &Path) -> Result<Option<LocalArchive>> {
        let path = local_dir.join(LOCAL_ARCHIVE_NAME);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                debug!(path = %path.display(), size = meta.len(), "Found local archive");
                Ok(Some(LocalArchive {
                    path,
                    size: meta.len(),
                }))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to stat local archive"),
        }
    }

    async fn find_remote(&self) -> Result<Option<RemoteArchive>> {
        let url = format!("{}/releases/latest", self.releases_base_url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "tapevault")
            .send()
            .await
            .context("Releases API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Releases API returned status {}", response.status());
        }

        let release: ReleaseResponse = response
            .json()
            .await
            .context("Failed to parse releases API response")?;

        let asset = release.assets.into_iter().find(is_data_archive);

        match asset {
            Some(asset) => {
                debug!(
                    tag = %release.tag_name,
                    asset = %asset.name,
                    size = asset.size,
                    "Found remote archive"
                );
                Ok(Some(RemoteArchive {
                    name: asset.name,
                    url: asset.browser_download_url,
                    size: asset.size,
                    tag: release.tag_name,
                }))
            }
            None => {
                debug!(tag = %release.tag_name, "Latest release has no data archive asset");
                Ok(None)
            }
        }
    }
}

/// An asset qualifies if its lowercase name starts with `data` and ends with `.zip`
fn is_data_archive(asset: &ReleaseAsset) -> bool {
    let name = asset.name.to_lowercase();
    name.starts_with("data") && name.ends_with(".zip")
}
