//! Archive extraction service
//!
//! The universal layer owns validation, output-directory lifecycle, progress
//! translation, and error wrapping. Byte-level decompression is delegated to
//! an injected [`ZipEngine`]; the default engine shells out to `unzip` via
//! tokio::process so the async runtime is never blocked.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One entry produced by extraction. Transient: consumed by the importer and
/// removed during pipeline cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Per-entry extraction progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractProgress {
    pub current: usize,
    pub total: usize,
}

/// Decompression primitive. Implementations must extract every entry,
/// preserve directory structure, report `(current, total)` per entry, and
/// return every entry (directories included) with its size.
#[async_trait]
pub trait ZipEngine: Send + Sync {
    async fn extract_all(
        &self,
        archive: &Path,
        output_dir: &Path,
        on_entry: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<Vec<ExtractedFile>>;
}

/// Default engine backed by the command-line `unzip` tool
pub struct CommandZipEngine;

#[async_trait]
impl ZipEngine for CommandZipEngine {
    async fn extract_all(
        &self,
        archive: &Path,
        output_dir: &Path,
        on_entry: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<Vec<ExtractedFile>> {
        // List entries first so progress has a denominator
        let listing = Command::new("unzip")
            .arg("-Z1")
            .arg(archive)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run unzip. Is unzip installed?")?;

        if !listing.status.success() {
            let stderr = String::from_utf8_lossy(&listing.stderr);
            anyhow::bail!("unzip listing failed: {}", stderr);
        }

        let total = String::from_utf8_lossy(&listing.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();

        let output = Command::new("unzip")
            .arg("-o") // Overwrite existing files
            .arg("-q") // Quiet mode
            .arg(archive)
            .arg("-d")
            .arg(output_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run unzip. Is unzip installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("unzip failed: {}", stderr);
        }

        collect_entries(output_dir, total, on_entry)
    }
}

/// Walk the output directory and describe every extracted entry
fn collect_entries(
    output_dir: &Path,
    total_hint: usize,
    on_entry: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<Vec<ExtractedFile>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(output_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;

        let relative_path = entry
            .path()
            .strip_prefix(output_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        entries.push(ExtractedFile {
            path: entry.path().to_path_buf(),
            relative_path,
            is_directory: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });

        on_entry(entries.len(), total_hint.max(entries.len()));
    }

    Ok(entries)
}

/// Archive extraction with a clean output directory per run
pub struct ArchiveExtractor {
    engine: Box<dyn ZipEngine>,
}

impl ArchiveExtractor {
    pub fn new(engine: Box<dyn ZipEngine>) -> Self {
        Self { engine }
    }

    /// Extract every entry of `archive` into `output_dir`.
    ///
    /// An existing output directory is deleted and recreated first, so
    /// re-runs never see stale entries from a prior extraction.
    pub async fn extract_all<F>(
        &self,
        archive: &Path,
        output_dir: &Path,
        mut on_progress: F,
    ) -> Result<Vec<ExtractedFile>>
    where
        F: FnMut(ExtractProgress) + Send,
    {
        if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
            anyhow::bail!("Archive does not exist: {}", archive.display());
        }

        if tokio::fs::try_exists(output_dir).await.unwrap_or(false) {
            debug!(dir = %output_dir.display(), "Removing stale extraction directory");
            tokio::fs::remove_dir_all(output_dir)
                .await
                .context("Failed to remove stale extraction directory")?;
        }
        tokio::fs::create_dir_all(output_dir)
            .await
            .context("Failed to create extraction directory")?;

        info!(
            archive = %archive.display(),
            destination = %output_dir.display(),
            "Starting archive extraction"
        );

        let mut adapter = |current: usize, total: usize| {
            on_progress(ExtractProgress { current, total });
        };

        let entries = self
            .engine
            .extract_all(archive, output_dir, &mut adapter)
            .await
            .with_context(|| format!("Extraction of {} failed", archive.display()))?;

        info!(entry_count = entries.len(), "Archive extraction complete");
        Ok(entries)
    }

    /// Recursively delete the extraction directory once importing is done
    pub async fn cleanup(&self, output_dir: &Path) -> Result<()> {
        if tokio::fs::try_exists(output_dir).await.unwrap_or(false) {
            info!(dir = %output_dir.display(), "Cleaning up extracted files");
            tokio::fs::remove_dir_all(output_dir)
                .await
                .context("Failed to clean up extraction directory")?;
        } else {
            warn!(dir = %output_dir.display(), "Extraction directory already gone");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Engine that fakes extraction by writing a fixed set of files
    pub(crate) struct FakeZipEngine {
        pub files: Vec<(String, String)>,
    }

    #[async_trait]
    impl ZipEngine for FakeZipEngine {
        async fn extract_all(
            &self,
            _archive: &Path,
            output_dir: &Path,
            on_entry: &mut (dyn FnMut(usize, usize) + Send),
        ) -> Result<Vec<ExtractedFile>> {
            for (relative, contents) in &self.files {
                let path = output_dir.join(relative);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, contents).await?;
            }
            collect_entries(output_dir, self.files.len(), on_entry)
        }
    }

    #[tokio::test]
    async fn test_missing_archive_is_an_error() {
        let extractor = ArchiveExtractor::new(Box::new(CommandZipEngine));
        let dir = tempfile::tempdir().unwrap();
        let result = extractor
            .extract_all(&dir.path().join("absent.zip"), &dir.path().join("out"), |_| {})
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stale_output_dir_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        tokio::fs::write(&archive, b"placeholder").await.unwrap();

        let out = dir.path().join("out");
        tokio::fs::create_dir_all(&out).await.unwrap();
        tokio::fs::write(out.join("stale.json"), b"{}").await.unwrap();

        let extractor = ArchiveExtractor::new(Box::new(FakeZipEngine {
            files: vec![("shows/1977-05-08.json".to_string(), "{}".to_string())],
        }));

        let entries = extractor.extract_all(&archive, &out, |_| {}).await.unwrap();

        assert!(!out.join("stale.json").exists());
        assert!(
            entries
                .iter()
                .all(|e| !e.relative_path.contains("stale.json"))
        );
        assert!(
            entries
                .iter()
                .any(|e| e.relative_path == "shows/1977-05-08.json")
        );
    }

    #[tokio::test]
    async fn test_progress_counts_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        tokio::fs::write(&archive, b"placeholder").await.unwrap();

        let extractor = ArchiveExtractor::new(Box::new(FakeZipEngine {
            files: vec![
                ("shows/a.json".to_string(), "{}".to_string()),
                ("shows/b.json".to_string(), "{}".to_string()),
            ],
        }));

        let mut seen = Vec::new();
        let entries = extractor
            .extract_all(&archive, &dir.path().join("out"), |p| seen.push(p))
            .await
            .unwrap();

        // shows/ directory plus two files
        assert_eq!(entries.len(), 3);
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0].current < w[1].current));
    }

    #[tokio::test]
    async fn test_cleanup_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        tokio::fs::create_dir_all(out.join("shows")).await.unwrap();

        let extractor = ArchiveExtractor::new(Box::new(CommandZipEngine));
        extractor.cleanup(&out).await.unwrap();
        assert!(!out.exists());
    }
}
