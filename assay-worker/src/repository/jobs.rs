//! Jobs repository
//!
//! Handles the job records persisted on disk:
//! - Listing every record under the jobs root
//! - Saving a record back over its file
//!
//! Layout: `<jobs_root>/<user dir>/<job id>.json`, one pretty-printed JSON
//! object per file.

use assay_core::domain::job::Job;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// A job record together with the file it was loaded from
///
/// The path is in-memory bookkeeping only and never written into the record.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub path: PathBuf,
    pub job: Job,
}

impl JobEntry {
    pub fn new(path: impl Into<PathBuf>, job: Job) -> Self {
        Self {
            path: path.into(),
            job,
        }
    }
}

/// Repository trait for job record operations
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Lists every readable job record
    ///
    /// Records that cannot be read or parsed are skipped, never reported:
    /// one corrupt file must not stop scheduling. Entries come back sorted
    /// by file path so callers see a stable order.
    async fn list_jobs(&self) -> Result<Vec<JobEntry>>;

    /// Reads the current content of a single record
    async fn load(&self, path: &Path) -> Result<Job>;

    /// Overwrites the record file with the full entry
    ///
    /// # Arguments
    /// * `entry` - The job and the file it belongs to
    async fn save(&self, entry: &JobEntry) -> Result<()>;
}

/// Filesystem implementation of JobRepository
pub struct FsJobRepository {
    root: PathBuf,
}

impl FsJobRepository {
    /// Creates a repository rooted at `root`
    ///
    /// The directory does not need to exist yet; an absent root simply
    /// holds no jobs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collects `*.json` files one level below each user directory
    async fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let mut user_dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) => {
                let err = StoreError::io(&self.root, e);
                if err.is_not_found() {
                    debug!("Jobs root {} does not exist yet", self.root.display());
                    return Ok(Vec::new());
                }
                return Err(err);
            }
        };

        let mut paths = Vec::new();

        while let Some(user_dir) = user_dirs
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let user_path = user_dir.path();
            if !user_dir.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let mut files = match tokio::fs::read_dir(&user_path).await {
                Ok(files) => files,
                Err(e) => {
                    warn!("Failed to read job directory {}: {}", user_path.display(), e);
                    continue;
                }
            };

            loop {
                match files.next_entry().await {
                    Ok(Some(file)) => {
                        let path = file.path();
                        let is_record = path.extension().is_some_and(|ext| ext == "json")
                            && file.file_type().await.is_ok_and(|t| t.is_file());
                        if is_record {
                            paths.push(path);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to list job directory {}: {}", user_path.display(), e);
                        break;
                    }
                }
            }
        }

        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl JobRepository for FsJobRepository {
    async fn list_jobs(&self) -> Result<Vec<JobEntry>> {
        let paths = self.record_paths().await?;
        let mut entries = Vec::with_capacity(paths.len());

        for path in paths {
            match self.load(&path).await {
                Ok(job) => entries.push(JobEntry::new(path, job)),
                // A malformed record will never be scheduled; a read error
                // is usually a file caught mid-write.
                Err(e) if e.is_invalid_record() => warn!("Skipping job record: {}", e),
                Err(e) => debug!("Skipping job record: {}", e),
            }
        }

        Ok(entries)
    }

    async fn load(&self, path: &Path) -> Result<Job> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::json(path, e))
    }

    async fn save(&self, entry: &JobEntry) -> Result<()> {
        let json = serde_json::to_string_pretty(&entry.job)
            .map_err(|e| StoreError::json(&entry.path, e))?;

        // Write beside the record and rename over it so a reader never sees
        // a half-written file.
        let tmp = entry.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &entry.path)
            .await
            .map_err(|e| StoreError::io(&entry.path, e))?;

        Ok(())
    }
}
