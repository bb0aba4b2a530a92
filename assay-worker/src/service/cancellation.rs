//! Cancellation gate
//!
//! A job is cancelled by dropping an empty `cancel.flag` file into its
//! output directory.

use assay_core::domain::job::Job;
use std::path::{Path, PathBuf};

/// Name of the cancellation marker inside a job's output directory
pub const CANCEL_MARKER: &str = "cancel.flag";

/// Location of the cancellation marker for `output_dir`
pub fn marker_path(output_dir: &Path) -> PathBuf {
    output_dir.join(CANCEL_MARKER)
}

/// Returns true iff the job's output directory holds a cancellation marker
pub fn is_cancelled(job: &Job) -> bool {
    marker_path(&job.output_dir).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_output(output_dir: &Path) -> Job {
        serde_json::from_value(serde_json::json!({
            "id": "j1",
            "status": "queued",
            "inputDir": "/in",
            "outputDir": output_dir,
        }))
        .unwrap()
    }

    #[test]
    fn test_marker_controls_cancellation() {
        let tmp = tempfile::tempdir().unwrap();
        let job = job_with_output(tmp.path());
        assert!(!is_cancelled(&job));

        std::fs::write(tmp.path().join(CANCEL_MARKER), "").unwrap();
        assert!(is_cancelled(&job));

        std::fs::remove_file(tmp.path().join(CANCEL_MARKER)).unwrap();
        assert!(!is_cancelled(&job));
    }

    #[test]
    fn test_missing_output_dir_is_not_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let job = job_with_output(&tmp.path().join("never-created"));
        assert!(!is_cancelled(&job));
    }
}
