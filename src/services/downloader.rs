//! Streaming archive download with progress reporting
//!
//! Streams the HTTP body chunk by chunk straight into the destination file.
//! Any stale file at the destination is deleted first; there is no
//! partial-file reuse and no retry at this layer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::locator::{LOCAL_ARCHIVE_NAME, RemoteArchive};

/// Progress events emitted while a download is in flight.
///
/// `bytes_so_far` is monotonically non-decreasing; when the server declared a
/// content length the final `Chunk` reports `bytes_so_far == total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadProgress {
    /// Emitted once before the first chunk, with zero bytes written
    Started { total: u64 },
    Chunk { bytes_so_far: u64, total: u64 },
    Done { bytes: u64 },
    Failed { message: String },
}

pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Download `remote` into `dest_dir`, reporting progress after every chunk.
    ///
    /// The file is always written under the well-known archive name, whatever
    /// the remote asset is called, so later discovery finds it as the local
    /// copy and a refresh can invalidate it. The declared content length wins
    /// over the size hint from discovery. On failure a terminal `Failed`
    /// event is emitted and the error returned.
    pub async fn download<F>(
        &self,
        remote: &RemoteArchive,
        dest_dir: &Path,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(DownloadProgress),
    {
        let dest = dest_dir.join(LOCAL_ARCHIVE_NAME);

        match self.download_inner(remote, dest_dir, &dest, &mut on_progress).await {
            Ok(bytes) => {
                info!(path = %dest.display(), bytes, "Download complete");
                on_progress(DownloadProgress::Done { bytes });
                Ok(dest)
            }
            Err(e) => {
                on_progress(DownloadProgress::Failed {
                    message: format!("{e:#}"),
                });
                Err(e)
            }
        }
    }

    async fn download_inner<F>(
        &self,
        remote: &RemoteArchive,
        dest_dir: &Path,
        dest: &Path,
        on_progress: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(DownloadProgress),
    {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .context("Failed to create download directory")?;

        // No partial-file reuse: any stale file is removed before writing
        self.delete_local_file(dest).await?;

        info!(url = %remote.url, dest = %dest.display(), "Starting download");

        let response = self
            .client
            .get(&remote.url)
            .send()
            .await
            .context("Download request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed with status {}", response.status());
        }

        let total = response.content_length().unwrap_or(remote.size);
        on_progress(DownloadProgress::Started { total });

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut bytes_so_far: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download stream error")?;
            file.write_all(&chunk)
                .await
                .context("Failed to write download chunk")?;
            bytes_so_far += chunk.len() as u64;
            on_progress(DownloadProgress::Chunk { bytes_so_far, total });
        }

        file.flush().await.context("Failed to flush download")?;
        debug!(bytes = bytes_so_far, declared = total, "Download stream finished");

        Ok(bytes_so_far)
    }

    /// Remove a previously downloaded file. A missing file is success.
    pub async fn delete_local_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted local file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete local file");
                Err(e).with_context(|| format!("Failed to delete {}", path.display()))
            }
        }
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}
