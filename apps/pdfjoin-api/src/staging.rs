//! Output file staging
//!
//! Results are written to a staging directory under an opaque reference
//! and handed to the client as a download URL. A reference can be
//! downloaded once; anything left behind is removed by the periodic sweep.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pdfjoin_core::OutputFile;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::jobs::JobTracker;

/// URL prefix under which staged files are served
pub const DOWNLOAD_PREFIX: &str = "/api/pdf/download/";

const CLAIM_SUFFIX: &str = ".claim";

/// Extra age a claimed file gets before the sweep may remove it. A rename
/// keeps the original mtime, so a claim can look expired while it is read.
const CLAIM_GRACE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("File not found or already downloaded")]
    NotFound,

    #[error("Staging I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Link to a staged output, as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLink {
    pub name: String,
    pub url: String,
}

impl FileLink {
    fn new(name: impl Into<String>, reference: &str) -> Self {
        Self {
            name: name.into(),
            url: format!("{}{}", DOWNLOAD_PREFIX, reference),
        }
    }
}

#[derive(Debug)]
pub struct FileStaging {
    dir: PathBuf,
}

impl FileStaging {
    /// Use `dir` for staged files, creating it if missing
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` under a fresh reference derived from `stem`
    pub async fn stage(&self, stem: &str, bytes: &[u8]) -> Result<String, StagingError> {
        let reference = new_reference(stem);
        let path = self.dir.join(&reference);

        if let Err(e) = tokio::fs::write(&path, bytes).await {
            // Don't leave a truncated file behind
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        debug!(reference = %reference, size = bytes.len(), "Staged file");
        Ok(reference)
    }

    /// Stage every output of one operation, in order.
    ///
    /// Either all files are staged or none are: on failure, files already
    /// written by this call are removed before the error is returned.
    pub async fn stage_batch(
        &self,
        files: Vec<OutputFile>,
    ) -> Result<Vec<FileLink>, StagingError> {
        let mut batch = StagedBatch::new(&self.dir);
        let mut links = Vec::with_capacity(files.len());

        for file in files {
            let stem = file.name.strip_suffix(".pdf").unwrap_or(&file.name);
            let reference = self.stage(stem, &file.bytes).await?;
            batch.push(&reference);
            links.push(FileLink::new(file.name, &reference));
        }

        batch.commit();
        info!(count = links.len(), "Staged output files");
        Ok(links)
    }

    /// Read and delete a staged file. Only one caller can consume a given
    /// reference; later calls get [`StagingError::NotFound`].
    pub async fn consume(&self, reference: &str) -> Result<Vec<u8>, StagingError> {
        let claim = self.claim(reference).await?;
        let bytes = read_claimed(&claim).await;
        if let Err(e) = tokio::fs::remove_file(&claim).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(reference, error = %e, "Failed to delete consumed file");
            }
        }

        let bytes = bytes?;
        info!(reference, size = bytes.len(), "Served staged file");
        Ok(bytes)
    }

    /// Move `reference` out of the served namespace. The rename is the
    /// claim: whoever moves the file owns it.
    async fn claim(&self, reference: &str) -> Result<PathBuf, StagingError> {
        if !is_valid_reference(reference) {
            return Err(StagingError::NotFound);
        }

        let claim = self.dir.join(format!(
            ".{}.{}{}",
            reference,
            Uuid::new_v4().simple(),
            CLAIM_SUFFIX
        ));
        match tokio::fs::rename(self.dir.join(reference), &claim).await {
            Ok(()) => Ok(claim),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StagingError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove staged files older than `retention`
    pub async fn sweep(&self, retention: Duration) -> Result<usize, StagingError> {
        self.sweep_at(SystemTime::now(), retention).await
    }

    /// Remove staged files whose age at `now` exceeds `retention`.
    ///
    /// Files that disappear mid-sweep (downloaded concurrently) are skipped.
    /// Claimed files get [`CLAIM_GRACE`] on top of `retention`.
    pub async fn sweep_at(
        &self,
        now: SystemTime,
        retention: Duration,
    ) -> Result<usize, StagingError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            let is_claim = entry.file_name().to_string_lossy().ends_with(CLAIM_SUFFIX);
            let limit = if is_claim {
                retention + CLAIM_GRACE
            } else {
                retention
            };
            if age <= limit {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(file = ?entry.file_name(), "Swept expired file");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = ?entry.file_name(), error = %e, "Failed to sweep file"),
            }
        }

        Ok(removed)
    }
}

/// Periodic cleanup settings
#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub interval: Duration,
    pub file_retention: Duration,
    pub job_retention: Duration,
}

/// Start the background task that sweeps staged files and evicts finished
/// jobs on a fixed interval
pub fn spawn_sweeper(
    staging: Arc<FileStaging>,
    jobs: JobTracker,
    schedule: SweepSchedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(schedule.interval);
        loop {
            interval.tick().await;

            match staging.sweep(schedule.file_retention).await {
                Ok(count) if count > 0 => info!(removed = count, "Swept expired staged files"),
                Err(e) => warn!(error = %e, "Staging sweep failed"),
                _ => {}
            }

            let cutoff = chrono::Utc::now()
                - chrono::Duration::from_std(schedule.job_retention)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
            let evicted = jobs.evict_finished_before(cutoff);
            if evicted > 0 {
                info!(evicted, "Evicted finished jobs");
            }
        }
    })
}

/// A claimed file swept before it could be read was never served
async fn read_claimed(claim: &Path) -> Result<Vec<u8>, StagingError> {
    match tokio::fs::read(claim).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StagingError::NotFound),
        Err(e) => Err(e.into()),
    }
}

/// Removes the files of a partially staged batch unless committed
struct StagedBatch<'a> {
    dir: &'a Path,
    written: Vec<String>,
    committed: bool,
}

impl<'a> StagedBatch<'a> {
    fn new(dir: &'a Path) -> Self {
        Self {
            dir,
            written: Vec::new(),
            committed: false,
        }
    }

    fn push(&mut self, reference: &str) {
        self.written.push(reference.to_string());
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedBatch<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for reference in &self.written {
            match std::fs::remove_file(self.dir.join(reference)) {
                Ok(()) => debug!(reference = %reference, "Removed file from failed batch"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(reference = %reference, error = %e, "Failed to clean up batch file")
                }
            }
        }
    }
}

/// `{stem}-{unix_millis}-{uuid}.pdf`
pub(crate) fn new_reference(stem: &str) -> String {
    let stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    let stem = if stem.is_empty() { "file".to_string() } else { stem };

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    format!("{}-{}-{}.pdf", stem, millis, Uuid::new_v4().simple())
}

/// File name to offer the client: the reference without its
/// `-{unix_millis}-{uuid}` suffix
pub(crate) fn download_name(reference: &str) -> String {
    let stem = reference.strip_suffix(".pdf").unwrap_or(reference);
    let mut parts = stem.rsplitn(3, '-');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(millis), Some(name))
            if id.len() == 32
                && id.chars().all(|c| c.is_ascii_hexdigit())
                && !millis.is_empty()
                && millis.chars().all(|c| c.is_ascii_digit()) =>
        {
            format!("{}.pdf", name)
        }
        _ => reference.to_string(),
    }
}

/// A reference is a bare `.pdf` file name produced by [`new_reference`]
pub(crate) fn is_valid_reference(reference: &str) -> bool {
    !reference.starts_with('.')
        && reference.ends_with(".pdf")
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !reference.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn staging() -> (TempDir, FileStaging) {
        let dir = TempDir::new().unwrap();
        let staging = FileStaging::new(dir.path().join("staged")).await.unwrap();
        (dir, staging)
    }

    fn output(name: &str, bytes: &[u8]) -> OutputFile {
        OutputFile {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_reference_shape() {
        let reference = new_reference("split-1-5");
        assert!(reference.starts_with("split-1-5-"));
        assert!(reference.ends_with(".pdf"));
        assert!(is_valid_reference(&reference));
    }

    #[test]
    fn test_reference_stem_is_sanitized() {
        let reference = new_reference("../../etc/passwd");
        assert!(!reference.contains('/'));
        assert!(is_valid_reference(&reference));
    }

    #[test]
    fn test_download_name_strips_suffix() {
        assert_eq!(download_name(&new_reference("merged")), "merged.pdf");
        assert_eq!(download_name(&new_reference("section-2-3-4")), "section-2-3-4.pdf");
        assert_eq!(download_name("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn test_path_like_references_rejected() {
        assert!(!is_valid_reference("../secret.pdf"));
        assert!(!is_valid_reference("a/b.pdf"));
        assert!(!is_valid_reference(".hidden.pdf"));
        assert!(!is_valid_reference("notes.txt"));
    }

    #[tokio::test]
    async fn test_consume_once() {
        let (_dir, staging) = staging().await;
        let reference = staging.stage("merged", b"%PDF-1.7 data").await.unwrap();

        let bytes = staging.consume(&reference).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7 data");

        assert!(matches!(
            staging.consume(&reference).await,
            Err(StagingError::NotFound)
        ));
        assert_eq!(file_count(staging.dir()), 0);
    }

    #[tokio::test]
    async fn test_consume_unknown_reference() {
        let (_dir, staging) = staging().await;
        assert!(matches!(
            staging.consume("missing-1-abc.pdf").await,
            Err(StagingError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_winner() {
        let (_dir, staging) = staging().await;
        let staging = Arc::new(staging);
        let reference = staging.stage("race", b"bytes").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let staging = staging.clone();
                let reference = reference.clone();
                tokio::spawn(async move { staging.consume(&reference).await.is_ok() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_stage_batch_links_in_order() {
        let (_dir, staging) = staging().await;
        let links = staging
            .stage_batch(vec![output("split-1-2.pdf", b"a"), output("split-3-4.pdf", b"b")])
            .await
            .unwrap();

        let names: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["split-1-2.pdf", "split-3-4.pdf"]);
        assert!(links[0].url.starts_with("/api/pdf/download/split-1-2-"));
        assert_eq!(file_count(staging.dir()), 2);
    }

    #[tokio::test]
    async fn test_uncommitted_batch_removes_written_files() {
        let (_dir, staging) = staging().await;
        let first = staging.stage("part", b"one").await.unwrap();
        let second = staging.stage("part", b"two").await.unwrap();
        {
            let mut batch = StagedBatch::new(staging.dir());
            batch.push(&first);
            batch.push(&second);
        }
        assert_eq!(file_count(staging.dir()), 0);
    }

    #[tokio::test]
    async fn test_sweep_after_retention_then_download_fails() {
        let (_dir, staging) = staging().await;
        let reference = staging.stage("merged", b"data").await.unwrap();

        let hour = Duration::from_secs(3600);
        let later = SystemTime::now() + Duration::from_secs(61 * 60);

        assert_eq!(staging.sweep_at(later, hour).await.unwrap(), 1);
        assert!(matches!(
            staging.consume(&reference).await,
            Err(StagingError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_claim_swept_before_read_is_not_found() {
        let (_dir, staging) = staging().await;
        let reference = staging.stage("merged", b"data").await.unwrap();

        let claim = staging.claim(&reference).await.unwrap();
        std::fs::remove_file(&claim).unwrap();

        assert!(matches!(
            read_claimed(&claim).await,
            Err(StagingError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_sweep_spares_claim_within_grace() {
        let (_dir, staging) = staging().await;
        let reference = staging.stage("merged", b"data").await.unwrap();
        let claim = staging.claim(&reference).await.unwrap();

        let hour = Duration::from_secs(3600);
        let just_expired = SystemTime::now() + hour + Duration::from_secs(1);
        assert_eq!(staging.sweep_at(just_expired, hour).await.unwrap(), 0);
        assert_eq!(read_claimed(&claim).await.unwrap(), b"data");

        let long_after = SystemTime::now() + hour + CLAIM_GRACE + Duration::from_secs(1);
        assert_eq!(staging.sweep_at(long_after, hour).await.unwrap(), 1);
        assert!(!claim.exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_files() {
        let (_dir, staging) = staging().await;
        let reference = staging.stage("fresh", b"data").await.unwrap();

        assert_eq!(staging.sweep(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(staging.consume(&reference).await.is_ok());
    }
}
