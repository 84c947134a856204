//! Job model: one job per ripped title, with a closed status enum and the
//! table of transitions the store is allowed to persist.

use crate::classify::DiscType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Status of a job in the rip/compress pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Row exists, rip not attempted yet.
    Created,
    /// The ripper is running for this title.
    Ripping,
    /// Rip failed; only a fresh disc insertion creates a new job.
    RipFailed,
    /// Rip succeeded and the file is on disk.
    Ripped,
    /// The encoder is running for this job.
    Compressing,
    /// Last compression attempt failed; picked up again by the next sweep.
    CompressFailed,
    /// Compression succeeded.
    Compressed,
    /// Compression deliberately bypassed.
    SkippedCompression,
    /// The ripped file vanished before it could be compressed.
    SourceMissing,
}

impl JobStatus {
    pub const ALL: [JobStatus; 9] = [
        JobStatus::Created,
        JobStatus::Ripping,
        JobStatus::RipFailed,
        JobStatus::Ripped,
        JobStatus::Compressing,
        JobStatus::CompressFailed,
        JobStatus::Compressed,
        JobStatus::SkippedCompression,
        JobStatus::SourceMissing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Ripping => "ripping",
            JobStatus::RipFailed => "rip_failed",
            JobStatus::Ripped => "ripped",
            JobStatus::Compressing => "compressing",
            JobStatus::CompressFailed => "compress_failed",
            JobStatus::Compressed => "compressed",
            JobStatus::SkippedCompression => "skipped_compression",
            JobStatus::SourceMissing => "source_missing",
        }
    }

    /// Statuses reachable from `self` in a single step.
    pub fn allowed_next(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Created => &[JobStatus::Ripping],
            JobStatus::Ripping => &[JobStatus::Ripped, JobStatus::RipFailed],
            JobStatus::Ripped | JobStatus::CompressFailed => &[
                JobStatus::Compressing,
                JobStatus::SkippedCompression,
                JobStatus::SourceMissing,
            ],
            JobStatus::Compressing => &[JobStatus::Compressed, JobStatus::CompressFailed],
            JobStatus::RipFailed
            | JobStatus::Compressed
            | JobStatus::SkippedCompression
            | JobStatus::SourceMissing => &[],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// No automatic transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Member of the ready-for-compression queue.
    pub fn is_ready_for_compression(&self) -> bool {
        matches!(self, JobStatus::Ripped | JobStatus::CompressFailed)
    }

    /// An external process is (or was, before a crash) working on the job.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, JobStatus::Ripping | JobStatus::Compressing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// Severity of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl HistoryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryLevel::Debug => "debug",
            HistoryLevel::Info => "info",
            HistoryLevel::Warning => "warning",
            HistoryLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for HistoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(HistoryLevel::Debug),
            "info" => Ok(HistoryLevel::Info),
            "warning" => Ok(HistoryLevel::Warning),
            "error" => Ok(HistoryLevel::Error),
            other => Err(format!("unknown history level '{}'", other)),
        }
    }
}

/// A ripped title tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: i64,
    /// Human-readable disc title (also the folder name).
    pub disc_title: String,
    /// Folder the disc's titles are ripped into.
    pub disc_path: PathBuf,
    pub disc_type: DiscType,
    /// Title index on the disc.
    pub title_index: u32,
    /// File name inside `disc_path`, known once the rip was submitted.
    pub filename: Option<String>,
    /// Hand the file to FileBot after processing.
    pub post_process: bool,
    pub status: JobStatus,
    /// Unix timestamp (milliseconds) when the job was created.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of the last status change.
    pub updated_at: i64,
}

impl Job {
    /// Full path of the title's file, if a filename was recorded.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.filename.as_ref().map(|name| self.disc_path.join(name))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Immutable audit-log line attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub job_id: i64,
    pub message: String,
    pub level: HistoryLevel,
    /// Unix timestamp (milliseconds).
    pub timestamp: i64,
}

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn status_strategy() -> impl Strategy<Value = JobStatus> {
        proptest::sample::select(JobStatus::ALL.to_vec())
    }

    // The full table, spelled out once so the match above is checked against it.
    const LEGAL: &[(JobStatus, JobStatus)] = &[
        (JobStatus::Created, JobStatus::Ripping),
        (JobStatus::Ripping, JobStatus::Ripped),
        (JobStatus::Ripping, JobStatus::RipFailed),
        (JobStatus::Ripped, JobStatus::Compressing),
        (JobStatus::Ripped, JobStatus::SkippedCompression),
        (JobStatus::Ripped, JobStatus::SourceMissing),
        (JobStatus::Compressing, JobStatus::Compressed),
        (JobStatus::Compressing, JobStatus::CompressFailed),
        (JobStatus::CompressFailed, JobStatus::Compressing),
        (JobStatus::CompressFailed, JobStatus::SkippedCompression),
        (JobStatus::CompressFailed, JobStatus::SourceMissing),
    ];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_transition_table_matches_listing(from in status_strategy(), to in status_strategy()) {
            let listed = LEGAL.contains(&(from, to));
            prop_assert_eq!(from.can_transition_to(to), listed, "{} -> {}", from, to);
        }

        #[test]
        fn prop_status_string_round_trip(status in status_strategy()) {
            prop_assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::RipFailed.is_terminal());
        assert!(JobStatus::Compressed.is_terminal());
        assert!(JobStatus::SkippedCompression.is_terminal());
        assert!(JobStatus::SourceMissing.is_terminal());
        assert!(!JobStatus::CompressFailed.is_terminal());
        assert!(!JobStatus::Ripped.is_terminal());
    }

    #[test]
    fn test_failure_never_returns_to_in_progress() {
        assert!(!JobStatus::RipFailed.can_transition_to(JobStatus::Ripping));
        assert!(!JobStatus::Compressed.can_transition_to(JobStatus::Ripping));
        assert!(!JobStatus::SourceMissing.can_transition_to(JobStatus::Compressing));
    }

    #[test]
    fn test_ready_for_compression() {
        let ready: Vec<_> = JobStatus::ALL
            .iter()
            .filter(|s| s.is_ready_for_compression())
            .collect();
        assert_eq!(ready, vec![&JobStatus::Ripped, &JobStatus::CompressFailed]);
    }

    #[test]
    fn test_history_level_ordering() {
        assert!(HistoryLevel::Error > HistoryLevel::Warning);
        assert_eq!("warning".parse::<HistoryLevel>(), Ok(HistoryLevel::Warning));
        assert!("loud".parse::<HistoryLevel>().is_err());
    }

    #[test]
    fn test_job_file_path() {
        let mut job = Job {
            id: 1,
            disc_title: "Heat".to_string(),
            disc_path: PathBuf::from("/srv/rips/Heat"),
            disc_type: DiscType::Movie,
            title_index: 0,
            filename: None,
            post_process: false,
            status: JobStatus::Created,
            created_at: current_timestamp_ms(),
            updated_at: current_timestamp_ms(),
        };
        assert_eq!(job.file_path(), None);

        job.filename = Some("Heat_t00.mkv".to_string());
        assert_eq!(
            job.file_path(),
            Some(PathBuf::from("/srv/rips/Heat/Heat_t00.mkv"))
        );
    }
}
