//! autorip
//!
//! Rips inserted discs with makemkvcon, tracks every title as a persistent
//! job and optionally compresses finished rips with HandBrakeCLI or ffmpeg.

pub mod classify;
pub mod compress;
pub mod eject;
pub mod encode;
pub mod jobs;
pub mod notify;
pub mod orchestrator;
pub mod process;
pub mod rip;
pub mod ripper;
pub mod sanitize;
pub mod scan;
pub mod startup;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use autorip_config as config;
pub use autorip_config::Config;
pub use classify::{classify_title, Classifier, DiscType, KeywordClassifier};
pub use compress::{CompressCoordinator, CompressReport};
pub use eject::{DriveEjector, EjectError, SystemEjector};
pub use encode::{build_encode_command, compressed_output_path, CommandEncoder, EncodeError, Encoder};
pub use jobs::{HistoryEntry, HistoryLevel, Job, JobStatus};
pub use notify::{JobEvent, JobEventKind, LogChannel, NotificationChannel, Notifier, NotifyError, WebhookChannel};
pub use orchestrator::{
    load_config, run, self_test, Collaborators, Mode, ModeError, ModeFlags, Orchestrator,
    RunError, RunSummary,
};
pub use process::{run_supervised, ProcessError, ToolCommand, ToolOutput};
pub use rip::{RipCoordinator, RipReport, RipSettings};
pub use ripper::{Disc, DiscInfo, DiscTitle, MakeMkv, RipError, Ripper};
pub use sanitize::{clean_special_chars, disc_folder_name, sanitize_filename, strip_accents};
pub use startup::{run_self_test, Check, SelfTestReport, StartupError};
pub use store::{JobStore, StoreError};
