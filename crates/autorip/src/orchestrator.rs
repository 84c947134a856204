//! Orchestrator: sequences the coordinators for one invocation.
//!
//! Every mutating mode first opens the store and recovers jobs a crashed run
//! left in progress. Job failures are reported through job state and
//! notifications; only configuration, store and self-test failures surface
//! as a [`RunError`].

use crate::classify::{Classifier, DiscType, KeywordClassifier};
use crate::compress::{CompressCoordinator, CompressReport};
use crate::eject::{DriveEjector, SystemEjector};
use crate::encode::{CommandEncoder, Encoder};
use crate::notify::{Notifier, NotifyError};
use crate::rip::{RipCoordinator, RipReport, RipSettings};
use crate::ripper::{MakeMkv, Ripper};
use crate::startup::{run_self_test, SelfTestReport};
use crate::store::{JobStore, StoreError};
use autorip_config::{Config, ConfigError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Rip,
    Compress,
    RipThenCompress,
    SkipCompress,
    All,
    SelfTest,
}

/// Mode selection flags as given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFlags {
    pub rip: bool,
    pub compress: bool,
    pub skip_compress: bool,
    pub all: bool,
    pub test: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("Nothing to do: pass one of --rip, --compress, --skip-compress, --all or --test")]
    Missing,

    #[error("{0} cannot be combined with {1}")]
    Conflict(&'static str, &'static str),
}

impl Mode {
    /// Resolve flags into a mode. Only `--rip --compress` may be combined.
    pub fn from_flags(flags: ModeFlags) -> Result<Mode, ModeError> {
        let selected: Vec<&'static str> = [
            (flags.rip, "--rip"),
            (flags.compress, "--compress"),
            (flags.skip_compress, "--skip-compress"),
            (flags.all, "--all"),
            (flags.test, "--test"),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| name)
        .collect();

        match selected.as_slice() {
            [] => Err(ModeError::Missing),
            ["--rip"] => Ok(Mode::Rip),
            ["--compress"] => Ok(Mode::Compress),
            ["--skip-compress"] => Ok(Mode::SkipCompress),
            ["--all"] => Ok(Mode::All),
            ["--test"] => Ok(Mode::SelfTest),
            ["--rip", "--compress"] => Ok(Mode::RipThenCompress),
            _ => {
                let offender = selected
                    .iter()
                    .copied()
                    .find(|name| *name != "--rip" && *name != "--compress")
                    .unwrap_or(selected[0]);
                let other = selected
                    .iter()
                    .copied()
                    .find(|name| *name != offender)
                    .unwrap_or(offender);
                Err(ModeError::Conflict(offender, other))
            }
        }
    }

    pub fn rips(&self) -> bool {
        matches!(self, Mode::Rip | Mode::RipThenCompress | Mode::All)
    }

    pub fn compresses(&self) -> bool {
        matches!(self, Mode::Compress | Mode::RipThenCompress | Mode::All)
    }
}

/// Error type for an invocation
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Notification setup failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Self-test failed: {0} check(s) did not pass")]
    SelfTestFailed(usize),
}

impl RunError {
    /// Process exit status for this failure. Never zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Mode(_) => 2,
            RunError::Config(_) | RunError::Notify(_) => 3,
            RunError::Store(_) => 4,
            RunError::SelfTestFailed(_) => 5,
        }
    }
}

/// What an invocation did.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Jobs moved out of an in-progress state at startup
    pub recovered: usize,
    pub rip: Option<RipReport>,
    pub compress: Option<CompressReport>,
    pub self_test: Option<SelfTestReport>,
}

impl RunSummary {
    pub fn cancelled(&self) -> bool {
        self.rip.as_ref().is_some_and(|r| r.cancelled)
            || self.compress.as_ref().is_some_and(|c| c.cancelled)
    }

    pub fn log(&self) {
        if let Some(rip) = &self.rip {
            info!(
                discs = rip.discs_found,
                skipped = rip.discs_skipped,
                ripped = rip.ripped,
                failed = rip.failed,
                "rip pass finished"
            );
        }
        if let Some(c) = &self.compress {
            info!(
                compressed = c.compressed,
                failed = c.failed,
                skipped = c.skipped,
                missing = c.missing,
                "compression pass finished"
            );
        }
        if self.cancelled() {
            warn!("stopped early on shutdown request");
        }
    }
}

/// Everything the coordinators talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub ripper: Arc<dyn Ripper>,
    pub classifier: Arc<dyn Classifier>,
    pub encoder: Arc<dyn Encoder>,
    pub ejector: Arc<dyn DriveEjector>,
    pub notifier: Arc<Notifier>,
}

impl Collaborators {
    /// The production adapters: makemkvcon, the keyword classifier, the
    /// configured encoder and the system eject tool.
    pub fn from_config(config: &Config) -> Result<Self, NotifyError> {
        Ok(Self {
            ripper: Arc::new(MakeMkv::new(&config.makemkv)),
            classifier: Arc::new(KeywordClassifier::new()),
            encoder: Arc::new(CommandEncoder::new(&config.compress)),
            ejector: Arc::new(SystemEjector),
            notifier: Arc::new(Notifier::from_config(&config.notification)?),
        })
    }
}

pub struct Orchestrator {
    config: Config,
    store: Arc<JobStore>,
    parts: Collaborators,
    forced_type: Option<DiscType>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Arc<JobStore>,
        parts: Collaborators,
        forced_type: Option<DiscType>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            parts,
            forced_type,
            cancel,
        }
    }

    /// Open the configured store and build the production collaborators.
    pub fn from_config(
        config: Config,
        forced_type: Option<DiscType>,
        cancel: CancellationToken,
    ) -> Result<Self, RunError> {
        let parts = Collaborators::from_config(&config)?;
        let store = Arc::new(JobStore::open(&config.database.path)?);
        Ok(Self::new(config, store, parts, forced_type, cancel))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    fn rip_coordinator(&self) -> RipCoordinator {
        RipCoordinator::new(
            self.store.clone(),
            self.parts.ripper.clone(),
            self.parts.classifier.clone(),
            self.parts.ejector.clone(),
            self.parts.notifier.clone(),
            RipSettings::from_config(&self.config, self.forced_type),
            self.cancel.clone(),
        )
    }

    fn compress_coordinator(&self) -> CompressCoordinator {
        CompressCoordinator::new(
            self.store.clone(),
            self.parts.encoder.clone(),
            self.parts.notifier.clone(),
            self.config.compress.remove_source,
            self.cancel.clone(),
        )
    }

    pub async fn run(&self, mode: Mode) -> Result<RunSummary, RunError> {
        if mode == Mode::SelfTest {
            return self_test(&self.config).await;
        }

        let mut summary = RunSummary {
            recovered: self.store.recover_interrupted()?.len(),
            ..RunSummary::default()
        };
        if summary.recovered > 0 {
            warn!(count = summary.recovered, "recovered jobs from an interrupted run");
        }

        if mode.rips() {
            summary.rip = Some(self.rip_coordinator().run().await?);
        }

        if mode.compresses() {
            if self.cancel.is_cancelled() {
                info!("shutdown requested, skipping compression");
            } else {
                summary.compress = Some(self.compress_coordinator().run().await?);
            }
        }

        if mode == Mode::SkipCompress {
            summary.compress = Some(self.compress_coordinator().skip_all().await?);
        }

        Ok(summary)
    }
}

/// Run every self-test check; fails when any check failed.
pub async fn self_test(config: &Config) -> Result<RunSummary, RunError> {
    let report = run_self_test(config).await;
    let failed = report.failures().count();
    if failed > 0 {
        return Err(RunError::SelfTestFailed(failed));
    }
    Ok(RunSummary {
        self_test: Some(report),
        ..RunSummary::default()
    })
}

/// Load the configuration for `mode`.
///
/// The self-test reports validation problems itself, so it only needs the
/// file to parse.
pub fn load_config(path: &Path, mode: Mode) -> Result<Config, ConfigError> {
    if mode == Mode::SelfTest {
        let mut config = Config::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    } else {
        Config::load(path)
    }
}

/// Full invocation: load config, build everything, run `mode`.
pub async fn run(
    config_path: &Path,
    mode: Mode,
    forced_type: Option<DiscType>,
    cancel: CancellationToken,
) -> Result<RunSummary, RunError> {
    let config = load_config(config_path, mode)?;
    if mode == Mode::SelfTest {
        return self_test(&config).await;
    }
    let orchestrator = Orchestrator::from_config(config, forced_type, cancel)?;
    let summary = orchestrator.run(mode).await?;
    summary.log();
    Ok(summary)
}
