//! Compression of finished rips.

pub mod command;

pub use command::{build_encode_command, CommandEncoder};

use crate::process::ProcessError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder could not be run, failed, or timed out
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Encoder reported success without producing the output file
    #[error("Encoder produced no output at {0}")]
    MissingOutput(PathBuf),

    /// IO error around the encode
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Re-encodes one file.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Destination for the compressed form of `source`.
    fn output_path_for(&self, source: &Path) -> PathBuf;

    /// Compress `source` into `output`. `output` does not exist beforehand.
    async fn compress(&self, source: &Path, output: &Path) -> Result<(), EncodeError>;
}

/// `<source dir>/<stem>.<format>`, or `<output_dir>/<disc folder>/<stem>.<format>`
/// when an output directory is configured. Never equal to `source`.
///
/// Keeping the disc folder under `output_dir` stops titles from different
/// discs that share a makemkv filename from colliding. When the plain name
/// would overwrite the source (same folder, same extension) the stem gets a
/// `.compressed` suffix.
pub fn compressed_output_path(source: &Path, output_dir: Option<&Path>, format: &str) -> PathBuf {
    let parent = source.parent();
    let dir = match output_dir {
        Some(root) => match parent.and_then(Path::file_name) {
            Some(folder) => root.join(folder),
            None => root.to_path_buf(),
        },
        None => parent.map(Path::to_path_buf).unwrap_or_default(),
    };
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let candidate = dir.join(format!("{}.{}", stem, format));
    if candidate == source {
        dir.join(format!("{}.compressed.{}", stem, format))
    } else {
        candidate
    }
}
