//! Locating the files a rip produced.
//!
//! makemkvcon is told which filename a title will get, but the name it
//! actually writes can differ (character substitutions, a different title
//! prefix). When the expected file is missing the disc folder is searched for
//! video files carrying the title's `_tNN` suffix.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions recognised in a disc folder (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mkv", ".mp4", ".avi", ".mov", ".m4v", ".ts", ".m2ts"];

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Whether the file stem ends in `_tNN` for `title_index`.
fn has_title_suffix(path: &Path, title_index: u32) -> bool {
    let suffix = format!("_t{:02}", title_index);
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.ends_with(&suffix))
        .unwrap_or(false)
}

/// Video files directly inside `dir` that belong to `title_index`, sorted.
pub fn find_title_outputs(dir: &Path, title_index: u32) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_video_file(path) && has_title_suffix(path, title_index))
        .collect();
    found.sort();
    found
}

/// Outcome of looking for a rip's output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RipOutput {
    /// Exactly one file to use
    Found(PathBuf),
    /// Nothing was written for the title
    Missing,
    /// Several candidates; refusing to guess
    Ambiguous(Vec<PathBuf>),
}

/// Resolves the file a rip wrote for `title_index`.
///
/// The expected name wins when present; otherwise a single `_tNN` match is
/// accepted and anything else is reported as missing or ambiguous.
pub fn resolve_rip_output(dir: &Path, expected: &str, title_index: u32) -> RipOutput {
    let expected_path = dir.join(expected);
    if expected_path.is_file() {
        return RipOutput::Found(expected_path);
    }

    let mut candidates = find_title_outputs(dir, title_index);
    match candidates.len() {
        0 => RipOutput::Missing,
        1 => RipOutput::Found(candidates.remove(0)),
        _ => RipOutput::Ambiguous(candidates),
    }
}
