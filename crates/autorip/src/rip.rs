//! Disc ripping coordinator.
//!
//! Turns every inserted disc into one job per acceptable title and drives
//! each job through `Created -> Ripping -> Ripped | RipFailed`. A disc whose
//! folder already exists is never touched again.

use crate::classify::{Classifier, DiscType, ForcedOrClassified};
use crate::eject::DriveEjector;
use crate::jobs::{HistoryLevel, JobStatus};
use crate::notify::{JobEvent, JobEventKind, Notifier};
use crate::ripper::{Disc, DiscTitle, Ripper};
use crate::sanitize::{disc_folder_name, sanitize_filename};
use crate::scan::{resolve_rip_output, RipOutput};
use crate::store::{JobStore, StoreError};
use autorip_config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings the rip coordinator needs from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RipSettings {
    pub save_path: PathBuf,
    pub min_length_secs: u64,
    pub eject: bool,
    /// Recorded on each job for FileBot
    pub post_process: bool,
    /// Operator override of the classifier
    pub forced_type: Option<DiscType>,
}

impl RipSettings {
    pub fn from_config(config: &Config, forced_type: Option<DiscType>) -> Self {
        Self {
            save_path: config.makemkv.save_path.clone(),
            min_length_secs: config.makemkv.min_length_secs,
            eject: config.makemkv.eject,
            post_process: config.filebot.enable,
            forced_type,
        }
    }
}

/// Counts from one rip pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RipReport {
    pub discs_found: usize,
    /// Discs whose folder already existed
    pub discs_skipped: usize,
    pub ripped: usize,
    pub failed: usize,
    /// Titles already tracked by another job
    pub duplicates: usize,
    /// A shutdown request stopped the pass early
    pub cancelled: bool,
}

pub struct RipCoordinator {
    store: Arc<JobStore>,
    ripper: Arc<dyn Ripper>,
    classifier: Arc<dyn Classifier>,
    ejector: Arc<dyn DriveEjector>,
    notifier: Arc<Notifier>,
    settings: RipSettings,
    cancel: CancellationToken,
}

impl RipCoordinator {
    pub fn new(
        store: Arc<JobStore>,
        ripper: Arc<dyn Ripper>,
        classifier: Arc<dyn Classifier>,
        ejector: Arc<dyn DriveEjector>,
        notifier: Arc<Notifier>,
        settings: RipSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            ripper,
            classifier,
            ejector,
            notifier,
            settings,
            cancel,
        }
    }

    /// Rip every title of every inserted disc that has no folder yet.
    ///
    /// Tool failures end up in job state; only store failures are returned.
    pub async fn run(&self) -> Result<RipReport, StoreError> {
        let mut report = RipReport::default();

        let discs = match self.ripper.find_discs().await {
            Ok(discs) => discs,
            Err(e) => {
                error!(error = %e, "could not list drives");
                return Ok(report);
            }
        };
        report.discs_found = discs.len();
        if discs.is_empty() {
            info!("Could not find any discs in drive list");
            return Ok(report);
        }
        debug!(count = discs.len(), "discs found");

        for disc in &discs {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.process_disc(disc, &mut report).await?;
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
        }
        Ok(report)
    }

    async fn process_disc(&self, disc: &Disc, report: &mut RipReport) -> Result<(), StoreError> {
        let folder = disc_folder_name(&disc.title);
        let disc_dir = self.settings.save_path.join(&folder);

        if disc_dir.exists() {
            info!(folder = %disc_dir.display(), "Video folder already exists, skipping disc");
            report.discs_skipped += 1;
            return Ok(());
        }

        let disc_type = ForcedOrClassified {
            forced: self.settings.forced_type,
            classifier: self.classifier.as_ref(),
        }
        .resolve(&disc.title)
        .await;

        if let Err(e) = tokio::fs::create_dir_all(&disc_dir).await {
            error!(folder = %disc_dir.display(), error = %e, "could not create disc folder");
            return Ok(());
        }

        let info = match self.ripper.disc_info(disc).await {
            Ok(info) => info,
            Err(e) => {
                error!(disc = %disc.title, error = %e, "could not read disc");
                remove_if_empty(&disc_dir).await;
                return Ok(());
            }
        };

        let titles = info.titles_at_least(self.settings.min_length_secs);
        if titles.is_empty() {
            info!(
                disc = %disc.title,
                min_length_secs = self.settings.min_length_secs,
                "No video titles found; try decreasing min_length_secs"
            );
            remove_if_empty(&disc_dir).await;
            return Ok(());
        }

        info!(
            disc = %disc.title,
            folder = %folder,
            disc_type = %disc_type,
            titles = titles.len(),
            "ripping disc"
        );

        for title in &titles {
            if self.cancel.is_cancelled() {
                info!(disc = %disc.title, "shutdown requested, not starting further titles");
                report.cancelled = true;
                break;
            }
            self.rip_title(disc, &folder, &disc_dir, disc_type, title, report)
                .await?;
        }

        if self.settings.eject {
            if let Err(e) = self.ejector.eject(&disc.location).await {
                warn!(location = %disc.location, error = %e, "could not eject drive");
            }
        }
        Ok(())
    }

    async fn rip_title(
        &self,
        disc: &Disc,
        folder: &str,
        disc_dir: &Path,
        disc_type: DiscType,
        title: &DiscTitle,
        report: &mut RipReport,
    ) -> Result<(), StoreError> {
        let mut job = match self.store.insert_job(
            folder,
            disc_dir,
            disc_type,
            title.index,
            self.settings.post_process,
        ) {
            Ok(job) => job,
            Err(StoreError::Duplicate { .. }) => {
                warn!(folder, title_index = title.index, "title already tracked, not ripping again");
                report.duplicates += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.store.update_status(
            &mut job,
            JobStatus::Ripping,
            Some(&title.filename),
            "Video submitted to MakeMKV",
            HistoryLevel::Info,
        )?;
        debug!(job_id = job.id, file = %title.filename, disc = %disc.title, "attempting rip");

        let started = Instant::now();
        let outcome = self.rip_and_rename(disc, disc_dir, title).await;
        let minutes = whole_minutes(started.elapsed());

        match outcome {
            Ok(filename) => {
                let reason = format!("Rip completed in {} minute(s)", minutes);
                self.store.update_status(
                    &mut job,
                    JobStatus::Ripped,
                    Some(&filename),
                    &reason,
                    HistoryLevel::Info,
                )?;
                info!(
                    job_id = job.id,
                    file = %filename,
                    minutes,
                    "It took {} minute(s) to rip {} from {}",
                    minutes,
                    filename,
                    folder
                );
                report.ripped += 1;
                self.notifier
                    .notify(&JobEvent::new(JobEventKind::RipComplete, &job, reason))
                    .await;
            }
            Err(reason) => {
                self.store.update_status(
                    &mut job,
                    JobStatus::RipFailed,
                    None,
                    &reason,
                    HistoryLevel::Error,
                )?;
                warn!(job_id = job.id, reason = %reason, "rip did not complete successfully");
                report.failed += 1;
                self.notifier
                    .notify(&JobEvent::new(JobEventKind::RipFailed, &job, reason))
                    .await;
            }
        }
        Ok(())
    }

    /// Rip the title and give its file the sanitized name.
    ///
    /// Returns the final file name, or the failure reason for the history.
    async fn rip_and_rename(
        &self,
        disc: &Disc,
        disc_dir: &Path,
        title: &DiscTitle,
    ) -> Result<String, String> {
        self.ripper
            .rip(disc, disc_dir, title.index)
            .await
            .map_err(|e| format!("MakeMKV failed to rip video: {}", e))?;

        let ripped = match resolve_rip_output(disc_dir, &title.filename, title.index) {
            RipOutput::Found(path) => path,
            RipOutput::Missing => {
                return Err(format!(
                    "MakeMKV reported success but no file for title {} was found",
                    title.index
                ))
            }
            RipOutput::Ambiguous(found) => {
                let names: Vec<String> = found
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect();
                return Err(format!(
                    "Several files match title {}: {}",
                    title.index,
                    names.join(", ")
                ));
            }
        };

        let ripped_name = ripped
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let clean = sanitize_filename(&ripped_name);
        if clean == ripped_name {
            return Ok(clean);
        }

        let target = disc_dir.join(&clean);
        if target.exists() {
            return Err(format!(
                "Refusing to rename {} over existing {}",
                ripped_name, clean
            ));
        }
        debug!(from = %ripped.display(), to = %target.display(), "renaming ripped file");
        tokio::fs::rename(&ripped, &target)
            .await
            .map_err(|e| format!("Could not rename {} to {}: {}", ripped_name, clean, e))?;
        Ok(clean)
    }
}

fn whole_minutes(elapsed: Duration) -> u64 {
    elapsed.as_secs() / 60
}

/// Drop a disc folder nothing was written to, so the disc can be retried.
async fn remove_if_empty(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        debug!(folder = %dir.display(), error = %e, "disc folder left in place");
    }
}
