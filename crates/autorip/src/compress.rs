//! Compression coordinator.
//!
//! Drains the compression queue (`Ripped` and `CompressFailed` jobs, oldest
//! first), one job at a time. A failing job is marked and the sweep moves on.

use crate::encode::Encoder;
use crate::jobs::{HistoryLevel, Job, JobStatus};
use crate::notify::{JobEvent, JobEventKind, Notifier};
use crate::sanitize::sanitize_filename;
use crate::store::{JobStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts from one compression or skip sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressReport {
    pub compressed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Jobs whose source file had disappeared
    pub missing: usize,
    pub cancelled: bool,
}

pub struct CompressCoordinator {
    store: Arc<JobStore>,
    encoder: Arc<dyn Encoder>,
    notifier: Arc<Notifier>,
    remove_source: bool,
    cancel: CancellationToken,
}

/// Where a queued job's file is, once its name was sanitized.
struct Source {
    filename: String,
    path: PathBuf,
}

impl CompressCoordinator {
    pub fn new(
        store: Arc<JobStore>,
        encoder: Arc<dyn Encoder>,
        notifier: Arc<Notifier>,
        remove_source: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            encoder,
            notifier,
            remove_source,
            cancel,
        }
    }

    fn source_of(job: &Job) -> Option<Source> {
        let filename = sanitize_filename(job.filename.as_deref()?);
        let path = job.disc_path.join(&filename);
        Some(Source { filename, path })
    }

    fn mark_missing(&self, job: &mut Job, report: &mut CompressReport) -> Result<(), StoreError> {
        self.store.update_status(
            job,
            JobStatus::SourceMissing,
            None,
            "Input file no longer exists",
            HistoryLevel::Error,
        )?;
        warn!(job_id = job.id, disc = %job.disc_title, "input file no longer exists");
        report.missing += 1;
        Ok(())
    }

    /// Compress every queued job.
    pub async fn run(&self) -> Result<CompressReport, StoreError> {
        let mut report = CompressReport::default();
        let jobs = self.store.list_jobs_ready_for_compression()?;
        if jobs.is_empty() {
            info!("Compression queue is empty");
            return Ok(report);
        }
        debug!(count = jobs.len(), "jobs waiting for compression");

        for mut job in jobs {
            if self.cancel.is_cancelled() {
                info!("shutdown requested, not starting further compressions");
                report.cancelled = true;
                break;
            }
            self.compress_job(&mut job, &mut report).await?;
        }
        Ok(report)
    }

    async fn compress_job(&self, job: &mut Job, report: &mut CompressReport) -> Result<(), StoreError> {
        let source = match Self::source_of(job) {
            Some(source) if source.path.is_file() => source,
            _ => return self.mark_missing(job, report),
        };

        let output = self.encoder.output_path_for(&source.path);
        if output.exists() {
            let reason = format!(
                "Output {} already exists, compression skipped",
                output.display()
            );
            self.store.update_status(
                job,
                JobStatus::SkippedCompression,
                Some(&source.filename),
                &reason,
                HistoryLevel::Warning,
            )?;
            info!(job_id = job.id, output = %output.display(), "output already exists, skipping");
            report.skipped += 1;
            return Ok(());
        }

        self.store.update_status(
            job,
            JobStatus::Compressing,
            Some(&source.filename),
            "Video submitted for compression",
            HistoryLevel::Info,
        )?;
        info!(job_id = job.id, file = %source.filename, disc = %job.disc_title, "Compressing");

        let started = Instant::now();
        let result = self.encoder.compress(&source.path, &output).await;
        let minutes = started.elapsed().as_secs() / 60;

        match result {
            Ok(()) => {
                let reason = format!("Compression completed successfully in {} minute(s)", minutes);
                self.store.update_status(
                    job,
                    JobStatus::Compressed,
                    None,
                    &reason,
                    HistoryLevel::Info,
                )?;
                info!(job_id = job.id, minutes, "It took {} minute(s) to compress {}", minutes, source.filename);
                report.compressed += 1;
                self.notifier
                    .notify(&JobEvent::new(JobEventKind::CompressComplete, job, reason))
                    .await;
                self.cleanup(job, &source).await?;
            }
            Err(e) => {
                let reason = format!("Compression failed: {}", e);
                self.store.update_status(
                    job,
                    JobStatus::CompressFailed,
                    None,
                    &reason,
                    HistoryLevel::Error,
                )?;
                warn!(job_id = job.id, error = %e, "Compression did not complete successfully");
                report.failed += 1;
                self.notifier
                    .notify(&JobEvent::new(JobEventKind::CompressFailed, job, reason))
                    .await;
            }
        }
        Ok(())
    }

    /// Best-effort removal of the rip after a successful compression.
    async fn cleanup(&self, job: &Job, source: &Source) -> Result<(), StoreError> {
        if !self.remove_source {
            return Ok(());
        }
        match tokio::fs::remove_file(&source.path).await {
            Ok(()) => {
                debug!(job_id = job.id, path = %source.path.display(), "removed source");
                self.store
                    .append_history(job, "Removed source file", HistoryLevel::Debug)
            }
            Err(e) => {
                warn!(job_id = job.id, path = %source.path.display(), error = %e, "could not remove source");
                Ok(())
            }
        }
    }

    /// Bypass compression for every queued job.
    ///
    /// Jobs whose file is still present become `SkippedCompression`; the
    /// rest become `SourceMissing`.
    pub async fn skip_all(&self) -> Result<CompressReport, StoreError> {
        let mut report = CompressReport::default();
        let jobs = self.store.list_jobs_ready_for_compression()?;
        if jobs.is_empty() {
            info!("Compression queue is empty");
            return Ok(report);
        }

        for mut job in jobs {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let source = match Self::source_of(&job) {
                Some(source) if source.path.is_file() => source,
                _ => {
                    self.mark_missing(&mut job, &mut report)?;
                    continue;
                }
            };
            self.store.update_status(
                &mut job,
                JobStatus::SkippedCompression,
                Some(&source.filename),
                "Compression skipped at operator request",
                HistoryLevel::Info,
            )?;
            info!(job_id = job.id, file = %source.filename, disc = %job.disc_title, "Skipping compression");
            report.skipped += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DiscType;
    use crate::testing::{FakeEncoder, RecordingChannel};
    use autorip_config::EventClass;
    use tempfile::TempDir;

    struct Harness {
        tmp: TempDir,
        store: Arc<JobStore>,
        channel: Arc<RecordingChannel>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
                store: Arc::new(JobStore::open_in_memory().unwrap()),
                channel: Arc::new(RecordingChannel::default()),
                cancel: CancellationToken::new(),
            }
        }

        fn disc_dir(&self) -> PathBuf {
            self.tmp.path().join("Heat")
        }

        /// A `Ripped` job whose file exists (or not) on disk.
        fn ripped_job(&self, title_index: u32, filename: &str, on_disk: bool) -> Job {
            let dir = self.disc_dir();
            std::fs::create_dir_all(&dir).unwrap();
            if on_disk {
                std::fs::write(dir.join(sanitize_filename(filename)), b"rip").unwrap();
            }
            let mut job = self
                .store
                .insert_job("Heat", &dir, DiscType::Movie, title_index, false)
                .unwrap();
            self.store
                .update_status(&mut job, JobStatus::Ripping, Some(filename), "submitted", HistoryLevel::Info)
                .unwrap();
            self.store
                .update_status(&mut job, JobStatus::Ripped, None, "ripped", HistoryLevel::Info)
                .unwrap();
            job
        }

        fn coordinator(&self, encoder: Arc<FakeEncoder>, remove_source: bool) -> CompressCoordinator {
            let notifier = Notifier::new(
                vec![self.channel.clone()],
                [EventClass::Compress, EventClass::Failure],
            );
            CompressCoordinator::new(
                self.store.clone(),
                encoder,
                Arc::new(notifier),
                remove_source,
                self.cancel.clone(),
            )
        }

        fn status(&self, job: &Job) -> JobStatus {
            self.store.get_job(job.id).unwrap().status
        }
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure() {
        let h = Harness::new();
        let first = h.ripped_job(0, "Heat_t00.mkv", true);
        let second = h.ripped_job(1, "Heat_t01.mkv", true);
        let third = h.ripped_job(2, "Heat_t02.mkv", true);

        let encoder = Arc::new(FakeEncoder::failing_for(&["Heat_t01.mkv"]));
        let report = h.coordinator(encoder.clone(), false).run().await.unwrap();

        assert_eq!(report.compressed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(encoder.calls().len(), 3);
        assert_eq!(h.status(&first), JobStatus::Compressed);
        assert_eq!(h.status(&second), JobStatus::CompressFailed);
        assert_eq!(h.status(&third), JobStatus::Compressed);

        let kinds: Vec<JobEventKind> = h.channel.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                JobEventKind::CompressComplete,
                JobEventKind::CompressFailed,
                JobEventKind::CompressComplete
            ]
        );

        // The failed job stays queued for the next sweep.
        let queued = h.store.list_jobs_ready_for_compression().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, second.id);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_dir_keeps_same_named_titles_of_two_discs_apart() {
        let h = Harness::new();
        let filename = "The_Wire_Season_1_t00.mkv";
        let mut jobs = Vec::new();
        for disc in ["The Wire S01 D1", "The Wire S01 D2"] {
            let dir = h.tmp.path().join(disc);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(filename), disc).unwrap();
            let mut job = h
                .store
                .insert_job(disc, &dir, DiscType::Tv, 0, false)
                .unwrap();
            h.store
                .update_status(&mut job, JobStatus::Ripping, Some(filename), "submitted", HistoryLevel::Info)
                .unwrap();
            h.store
                .update_status(&mut job, JobStatus::Ripped, None, "ripped", HistoryLevel::Info)
                .unwrap();
            jobs.push(job);
        }

        let out = h.tmp.path().join("compressed");
        let config = autorip_config::CompressConfig {
            binary: Some("sh".to_string()),
            args: vec![
                "-c".to_string(),
                "cp \"$0\" \"$1\"".to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
            nice: 0,
            output_dir: Some(out.clone()),
            ..autorip_config::CompressConfig::default()
        };
        let notifier = Notifier::new(vec![h.channel.clone()], [EventClass::Compress]);
        let coordinator = CompressCoordinator::new(
            h.store.clone(),
            Arc::new(crate::encode::CommandEncoder::new(&config)),
            Arc::new(notifier),
            false,
            h.cancel.clone(),
        );

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.compressed, 2);
        assert_eq!(report.skipped, 0);
        for job in &jobs {
            assert_eq!(h.status(job), JobStatus::Compressed);
        }
        let ext = &config.format;
        for disc in ["The Wire S01 D1", "The Wire S01 D2"] {
            let output = out.join(disc).join(format!("The_Wire_Season_1_t00.{}", ext));
            assert_eq!(std::fs::read_to_string(output).unwrap(), disc);
        }
    }

    #[tokio::test]
    async fn test_existing_output_skips_without_encoding() {
        let h = Harness::new();
        let job = h.ripped_job(0, "Heat_t00.mkv", true);
        std::fs::write(h.disc_dir().join("Heat_t00.mp4"), b"already there").unwrap();

        let encoder = Arc::new(FakeEncoder::default());
        let report = h.coordinator(encoder.clone(), false).run().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert!(encoder.calls().is_empty());
        assert_eq!(h.status(&job), JobStatus::SkippedCompression);
        assert_eq!(
            std::fs::read(h.disc_dir().join("Heat_t00.mp4")).unwrap(),
            b"already there"
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_distinct_state() {
        let h = Harness::new();
        let job = h.ripped_job(0, "Heat_t00.mkv", false);

        let encoder = Arc::new(FakeEncoder::default());
        let report = h.coordinator(encoder.clone(), false).run().await.unwrap();

        assert_eq!(report.missing, 1);
        assert!(encoder.calls().is_empty());
        assert_eq!(h.status(&job), JobStatus::SourceMissing);
        assert!(h.channel.events().is_empty());

        let last = h.store.history(job.id).unwrap().pop().unwrap();
        assert_eq!(last.message, "Input file no longer exists");
        assert_eq!(last.level, HistoryLevel::Error);
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_noop() {
        let h = Harness::new();
        let encoder = Arc::new(FakeEncoder::default());
        let coordinator = h.coordinator(encoder.clone(), false);
        assert_eq!(coordinator.run().await.unwrap(), CompressReport::default());
        assert_eq!(coordinator.run().await.unwrap(), CompressReport::default());
        assert_eq!(coordinator.skip_all().await.unwrap(), CompressReport::default());
        assert!(encoder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stored_filename_is_sanitized() {
        let h = Harness::new();
        let job = h.ripped_job(0, "Amélie_t00.mkv", true);

        let encoder = Arc::new(FakeEncoder::default());
        h.coordinator(encoder.clone(), false).run().await.unwrap();

        assert_eq!(encoder.calls(), vec![h.disc_dir().join("Amelie_t00.mkv")]);
        let stored = h.store.get_job(job.id).unwrap();
        assert_eq!(stored.filename.as_deref(), Some("Amelie_t00.mkv"));
        assert_eq!(stored.status, JobStatus::Compressed);
    }

    #[tokio::test]
    async fn test_remove_source_after_success() {
        let h = Harness::new();
        let job = h.ripped_job(0, "Heat_t00.mkv", true);
        let encoder = Arc::new(FakeEncoder::default());
        h.coordinator(encoder, true).run().await.unwrap();

        assert!(!h.disc_dir().join("Heat_t00.mkv").exists());
        assert!(h.disc_dir().join("Heat_t00.mp4").exists());
        let last = h.store.history(job.id).unwrap().pop().unwrap();
        assert_eq!(last.message, "Removed source file");
    }

    #[tokio::test]
    async fn test_skip_all_splits_present_and_missing() {
        let h = Harness::new();
        let present = h.ripped_job(0, "Heat_t00.mkv", true);
        let gone = h.ripped_job(1, "Heat_t01.mkv", false);

        let encoder = Arc::new(FakeEncoder::default());
        let report = h.coordinator(encoder.clone(), false).skip_all().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.missing, 1);
        assert!(encoder.calls().is_empty());
        assert_eq!(h.status(&present), JobStatus::SkippedCompression);
        assert_eq!(h.status(&gone), JobStatus::SourceMissing);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_jobs() {
        let h = Harness::new();
        h.ripped_job(0, "Heat_t00.mkv", true);
        h.cancel.cancel();

        let encoder = Arc::new(FakeEncoder::default());
        let report = h.coordinator(encoder.clone(), false).run().await.unwrap();
        assert!(report.cancelled);
        assert!(encoder.calls().is_empty());
        assert!(h.disc_dir().join("Heat_t00.mkv").exists());
    }
}
