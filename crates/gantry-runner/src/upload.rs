//! Coverage report uploaders.

use async_trait::async_trait;
use gantry_core::job::{CoverageReport, JobInstance, UploadStatus};
use gantry_core::ports::CoverageUploader;
use gantry_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Publishes reports by writing them into a directory, one file per
/// instance: `<job>-<os>-<file name>`.
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target(&self, instance: &JobInstance, report: &CoverageReport) -> PathBuf {
        let file_name = Path::new(&report.file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "coverage".to_string());
        self.root
            .join(format!("{}-{}-{}", instance.job, instance.os, file_name))
    }
}

#[async_trait]
impl CoverageUploader for DirectoryUploader {
    async fn upload(
        &self,
        instance: &JobInstance,
        report: &CoverageReport,
    ) -> Result<UploadStatus> {
        if report.content.trim().is_empty() {
            return Err(Error::CoverageUpload(format!(
                "{} is empty",
                report.file
            )));
        }

        let target = self.target(instance, report);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::CoverageUpload(format!("{}: {}", self.root.display(), e)))?;
        tokio::fs::write(&target, report.content.as_bytes())
            .await
            .map_err(|e| Error::CoverageUpload(format!("{}: {}", target.display(), e)))?;

        info!(path = %target.display(), "Uploaded coverage report");
        Ok(UploadStatus::Uploaded {
            location: target.display().to_string(),
        })
    }
}

/// Uploader for local runs where reports are kept but not published.
pub struct NoopUploader;

#[async_trait]
impl CoverageUploader for NoopUploader {
    async fn upload(
        &self,
        _instance: &JobInstance,
        _report: &CoverageReport,
    ) -> Result<UploadStatus> {
        Ok(UploadStatus::NotAttempted)
    }
}
