//! Ripping tool interface.
//!
//! The coordinator only sees [`Ripper`]; `makemkv` holds the makemkvcon
//! adapter.

pub mod makemkv;

pub use makemkv::{parse_disc_info, parse_drive_list, rip_succeeded, MakeMkv};

use crate::process::ProcessError;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Error type for ripping operations
#[derive(Debug, Error)]
pub enum RipError {
    /// The ripping tool could not be run or exited badly
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The tool exited cleanly but reported no saved title
    #[error("No titles saved: {0}")]
    NothingSaved(String),

    /// Output of the tool could not be understood
    #[error("Unexpected ripper output: {0}")]
    Parse(String),
}

/// An optical disc present in a drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disc {
    /// Volume title reported by the drive
    pub title: String,
    /// Drive index as understood by the ripping tool
    pub index: u32,
    /// Device path, used for ejecting
    pub location: String,
}

/// A title on a disc that could be ripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscTitle {
    pub index: u32,
    /// File name the ripper will write for this title
    pub filename: String,
    /// Runtime in seconds
    pub length_secs: u64,
}

/// Details read from a disc.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscInfo {
    /// Disc name from the disc's metadata, when it has one
    pub name: Option<String>,
    pub titles: Vec<DiscTitle>,
}

impl DiscInfo {
    /// Titles at least `min_length_secs` long, in index order.
    pub fn titles_at_least(&self, min_length_secs: u64) -> Vec<DiscTitle> {
        let mut titles: Vec<DiscTitle> = self
            .titles
            .iter()
            .filter(|t| t.length_secs >= min_length_secs)
            .cloned()
            .collect();
        titles.sort_by_key(|t| t.index);
        titles
    }
}

/// Disc discovery and title extraction.
#[async_trait]
pub trait Ripper: Send + Sync {
    /// Discs currently inserted in any drive.
    async fn find_discs(&self) -> Result<Vec<Disc>, RipError>;

    /// Name and candidate titles of a disc.
    async fn disc_info(&self, disc: &Disc) -> Result<DiscInfo, RipError>;

    /// Rip one title into `save_dir`, writing the title's `filename` there.
    async fn rip(&self, disc: &Disc, save_dir: &Path, title_index: u32) -> Result<(), RipError>;
}
