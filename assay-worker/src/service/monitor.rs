//! Progress and heartbeat monitor
//!
//! Tracks two independent clocks for a running job:
//! - heartbeat: refreshed on a fixed cadence no matter what the runner does
//! - progress: refreshed only when the runner reports a new percentage
//!
//! Only the progress clock can fail a job. A long computation may hold the
//! same percentage for a while, but if it holds it past the timeout the job
//! is considered stuck.

use assay_core::domain::job::Job;
use assay_core::domain::timestamp::Timestamp;
use std::path::Path;
use tokio::time::{Duration, Instant};

/// Supervision state carried across wait-loop ticks
#[derive(Debug)]
pub struct ProgressMonitor {
    heartbeat_interval: Duration,
    progress_timeout: Duration,
    last_value: Option<u8>,
    last_progress_at: Instant,
    last_heartbeat_at: Option<Instant>,
}

impl ProgressMonitor {
    /// Starts both clocks at `started_at`
    ///
    /// The first call to [`heartbeat_due`](Self::heartbeat_due) always fires.
    pub fn new(started_at: Instant, heartbeat_interval: Duration, progress_timeout: Duration) -> Self {
        Self {
            heartbeat_interval,
            progress_timeout,
            last_value: None,
            last_progress_at: started_at,
            last_heartbeat_at: None,
        }
    }

    /// Feeds a progress reading into the job
    ///
    /// Returns true when the job accepted the reading; the caller should
    /// then persist it. Any reading that differs from the previous one
    /// restarts the staleness clock, including a first `0` that matches the
    /// claimed progress. Repeated readings of the same value, and values
    /// that would lower the job's progress, leave the clock running.
    pub fn observe_progress(&mut self, now: Instant, value: u8, job: &mut Job) -> bool {
        if self.last_value == Some(value) {
            return false;
        }
        self.last_value = Some(value);

        if !job.record_progress(value, Timestamp::now()) {
            return false;
        }
        self.last_progress_at = now;
        true
    }

    /// Whether the heartbeat should be refreshed at `now`
    ///
    /// Restarts the heartbeat clock when it returns true.
    pub fn heartbeat_due(&mut self, now: Instant) -> bool {
        let due = self
            .last_heartbeat_at
            .is_none_or(|last| now.duration_since(last) >= self.heartbeat_interval);
        if due {
            self.last_heartbeat_at = Some(now);
        }
        due
    }

    /// Whether progress has been flat for at least the timeout
    pub fn is_stale(&self, now: Instant) -> bool {
        now.duration_since(self.last_progress_at) >= self.progress_timeout
    }
}

/// Reads the runner's progress file
///
/// Returns `None` when the file is missing or does not hold a plain
/// non-negative integer. Values beyond `u8` saturate at 255 and are
/// clamped by the job.
pub fn read_progress(path: &Path) -> Option<u8> {
    let raw = std::fs::read_to_string(path).ok()?;
    parse_progress(&raw)
}

fn parse_progress(raw: &str) -> Option<u8> {
    let digits = raw.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = digits.trim_start_matches('0');
    if value.len() > 3 {
        return Some(u8::MAX);
    }
    Some(value.parse::<u16>().unwrap_or(0).min(u8::MAX as u16) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const HEARTBEAT: Duration = Duration::from_secs(10);
    const TIMEOUT: Duration = Duration::from_secs(15 * 60);

    fn running_job() -> Job {
        let mut job: Job = serde_json::from_value(serde_json::json!({
            "id": "j1",
            "status": "queued",
            "inputDir": "/in",
            "outputDir": "/out",
        }))
        .unwrap();
        job.start(Timestamp::now(), PathBuf::from("/out/worker.log"))
            .unwrap();
        job
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("40\n"), Some(40));
        assert_eq!(parse_progress("  007 "), Some(7));
        assert_eq!(parse_progress("0"), Some(0));
        assert_eq!(parse_progress("100"), Some(100));
        assert_eq!(parse_progress("999"), Some(255));
        assert_eq!(parse_progress("123456789012345678901234567890"), Some(255));
        assert_eq!(parse_progress(""), None);
        assert_eq!(parse_progress("-5"), None);
        assert_eq!(parse_progress("4.5"), None);
        assert_eq!(parse_progress("forty"), None);
    }

    #[test]
    fn test_read_progress_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(read_progress(&tmp.path().join("progress.txt")), None);

        std::fs::write(tmp.path().join("progress.txt"), "55").unwrap();
        assert_eq!(read_progress(&tmp.path().join("progress.txt")), Some(55));
    }

    #[test]
    fn test_progress_change_updates_job_and_clock() {
        let start = Instant::now();
        let mut monitor = ProgressMonitor::new(start, HEARTBEAT, TIMEOUT);
        let mut job = running_job();
        let before = job.last_progress_at.clone().unwrap();

        assert!(monitor.observe_progress(start + Duration::from_secs(1), 10, &mut job));
        assert_eq!(job.progress, Some(10));

        let t = start + Duration::from_secs(14 * 60);
        assert!(monitor.observe_progress(t, 40, &mut job));
        assert_eq!(job.progress, Some(40));
        assert!(job.last_progress_at.clone().unwrap() >= before);

        // Fourteen more minutes on the same value is still within bounds.
        assert!(!monitor.observe_progress(t + Duration::from_secs(60), 40, &mut job));
        assert!(!monitor.is_stale(t + Duration::from_secs(14 * 60)));
        assert!(monitor.is_stale(t + TIMEOUT));
    }

    #[test]
    fn test_regressing_progress_does_not_reset_staleness() {
        let start = Instant::now();
        let mut monitor = ProgressMonitor::new(start, HEARTBEAT, TIMEOUT);
        let mut job = running_job();

        assert!(monitor.observe_progress(start, 60, &mut job));
        assert!(!monitor.observe_progress(start + Duration::from_secs(600), 30, &mut job));
        assert_eq!(job.progress, Some(60));
        assert!(monitor.is_stale(start + TIMEOUT));
    }

    #[test]
    fn test_first_zero_reading_restarts_staleness_clock() {
        let start = Instant::now();
        let mut monitor = ProgressMonitor::new(start, HEARTBEAT, TIMEOUT);
        let mut job = running_job();
        let claimed = job.last_progress_at.clone().unwrap();

        // Long warm-up before the runner writes its first reading.
        let first = start + Duration::from_secs(14 * 60);
        assert!(monitor.observe_progress(first, 0, &mut job));
        assert_eq!(job.progress, Some(0));
        assert!(job.last_progress_at.clone().unwrap() >= claimed);

        assert!(!monitor.is_stale(start + Duration::from_secs(16 * 60)));
        assert!(!monitor.observe_progress(first + Duration::from_secs(60), 0, &mut job));
        assert!(monitor.is_stale(first + TIMEOUT));
    }

    #[test]
    fn test_stale_without_any_progress() {
        let start = Instant::now();
        let monitor = ProgressMonitor::new(start, HEARTBEAT, TIMEOUT);
        assert!(!monitor.is_stale(start + TIMEOUT - Duration::from_secs(1)));
        assert!(monitor.is_stale(start + TIMEOUT));
    }

    #[test]
    fn test_heartbeat_cadence_is_independent_of_progress() {
        let start = Instant::now();
        let mut monitor = ProgressMonitor::new(start, HEARTBEAT, TIMEOUT);

        assert!(monitor.heartbeat_due(start));
        assert!(!monitor.heartbeat_due(start + Duration::from_secs(9)));
        assert!(monitor.heartbeat_due(start + Duration::from_secs(10)));
        assert!(!monitor.heartbeat_due(start + Duration::from_secs(15)));
        assert!(monitor.heartbeat_due(start + Duration::from_secs(21)));
        assert!(!monitor.is_stale(start + Duration::from_secs(21)));
    }
}
