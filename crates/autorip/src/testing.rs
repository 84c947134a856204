//! In-crate fakes of every collaborator, for coordinator tests.

use crate::classify::DiscType;
use crate::eject::{DriveEjector, EjectError};
use crate::encode::{compressed_output_path, EncodeError, Encoder};
use crate::jobs::{Job, JobStatus};
use crate::notify::{JobEvent, NotificationChannel, NotifyError};
use crate::process::ProcessError;
use crate::ripper::{Disc, DiscInfo, DiscTitle, RipError, Ripper};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn sample_job() -> Job {
    Job {
        id: 7,
        disc_title: "Heat".to_string(),
        disc_path: PathBuf::from("/srv/rips/Heat"),
        disc_type: DiscType::Movie,
        title_index: 0,
        filename: Some("Heat_t00.mkv".to_string()),
        post_process: false,
        status: JobStatus::Ripped,
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
    }
}

pub fn disc(title: &str, index: u32) -> Disc {
    Disc {
        title: title.to_string(),
        index,
        location: format!("/dev/sr{}", index),
    }
}

pub fn disc_title(index: u32, filename: &str, length_secs: u64) -> DiscTitle {
    DiscTitle {
        index,
        filename: filename.to_string(),
        length_secs,
    }
}

fn tool_failure(program: &str) -> ProcessError {
    ProcessError::Failed {
        program: program.to_string(),
        code: 1,
        stderr_tail: "simulated failure".to_string(),
    }
}

/// What the fake ripper does for a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RipBehaviour {
    /// Write the title's advertised filename
    WriteExpected,
    /// Write a file under another name
    WriteAs(String),
    /// Write several files
    WriteMany(Vec<String>),
    /// Exit successfully without writing anything
    WriteNothing,
    /// Exit with an error
    Fail,
}

#[derive(Default)]
pub struct FakeRipper {
    pub discs: Vec<Disc>,
    pub infos: HashMap<u32, DiscInfo>,
    /// Keyed by title index; `WriteExpected` when absent
    pub behaviours: HashMap<u32, RipBehaviour>,
    pub fail_find: bool,
    rips: Mutex<Vec<(u32, u32)>>,
}

impl FakeRipper {
    /// A ripper whose drive listing fails.
    pub fn failing_find() -> Self {
        Self {
            fail_find: true,
            ..Self::default()
        }
    }

    pub fn with_disc(mut self, disc: Disc, info: DiscInfo) -> Self {
        self.infos.insert(disc.index, info);
        self.discs.push(disc);
        self
    }

    pub fn behave(mut self, title_index: u32, behaviour: RipBehaviour) -> Self {
        self.behaviours.insert(title_index, behaviour);
        self
    }

    /// `(drive index, title index)` of every rip attempted.
    pub fn rips(&self) -> Vec<(u32, u32)> {
        self.rips.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ripper for FakeRipper {
    async fn find_discs(&self) -> Result<Vec<Disc>, RipError> {
        if self.fail_find {
            return Err(tool_failure("makemkvcon").into());
        }
        Ok(self.discs.clone())
    }

    async fn disc_info(&self, disc: &Disc) -> Result<DiscInfo, RipError> {
        self.infos
            .get(&disc.index)
            .cloned()
            .ok_or_else(|| RipError::Parse(format!("no info for disc {}", disc.index)))
    }

    async fn rip(&self, disc: &Disc, save_dir: &Path, title_index: u32) -> Result<(), RipError> {
        self.rips.lock().unwrap().push((disc.index, title_index));

        let expected = self
            .infos
            .get(&disc.index)
            .and_then(|info| info.titles.iter().find(|t| t.index == title_index))
            .map(|t| t.filename.clone())
            .unwrap_or_else(|| format!("title_t{:02}.mkv", title_index));

        let names = match self
            .behaviours
            .get(&title_index)
            .cloned()
            .unwrap_or(RipBehaviour::WriteExpected)
        {
            RipBehaviour::WriteExpected => vec![expected],
            RipBehaviour::WriteAs(name) => vec![name],
            RipBehaviour::WriteMany(names) => names,
            RipBehaviour::WriteNothing => Vec::new(),
            RipBehaviour::Fail => return Err(tool_failure("makemkvcon").into()),
        };
        for name in names {
            std::fs::write(save_dir.join(name), b"ripped").unwrap();
        }
        Ok(())
    }
}

/// Encoder writing `<stem>.mp4` next to the source, failing for chosen files.
#[derive(Default)]
pub struct FakeEncoder {
    /// Source file names that make the encode fail
    pub fail_for: HashSet<String>,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeEncoder {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            fail_for: names.iter().map(|n| n.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    fn output_path_for(&self, source: &Path) -> PathBuf {
        compressed_output_path(source, None, "mp4")
    }

    async fn compress(&self, source: &Path, output: &Path) -> Result<(), EncodeError> {
        self.calls.lock().unwrap().push(source.to_path_buf());
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_for.contains(&name) {
            return Err(tool_failure("HandBrakeCLI").into());
        }
        std::fs::write(output, b"compressed")?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEjector {
    pub fail: bool,
    ejected: Mutex<Vec<String>>,
}

impl FakeEjector {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn ejected(&self) -> Vec<String> {
        self.ejected.lock().unwrap().clone()
    }
}

#[async_trait]
impl DriveEjector for FakeEjector {
    async fn eject(&self, location: &str) -> Result<(), EjectError> {
        self.ejected.lock().unwrap().push(location.to_string());
        if self.fail {
            return Err(tool_failure("eject").into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingChannel {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, event: &JobEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct FailingChannel;

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _event: &JobEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("503 - unavailable".to_string()))
    }
}
