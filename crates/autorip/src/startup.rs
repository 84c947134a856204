//! Self-test checks
//!
//! Verifies everything a run depends on without changing anything:
//! - Configuration validity
//! - The save path exists and is a writable directory
//! - The job database (if present) opens read-only and passes an integrity check
//! - makemkvcon, the configured encoder and the eject tool can be started

use crate::process::is_available;
use crate::store::{JobStore, StoreError};
use autorip_config::{CompressMethod, Config, ConfigError};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Error types for self-test checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Save path {0} does not exist")]
    SavePathMissing(String),

    #[error("Save path {0} is not a writable directory")]
    SavePathUnusable(String),

    #[error("Job database unusable: {0}")]
    Database(#[from] StoreError),

    #[error("{0} is not available; is it installed and in PATH?")]
    ToolUnavailable(String),
}

/// Result of one named check.
#[derive(Debug)]
pub struct Check {
    pub name: &'static str,
    pub outcome: Result<String, StartupError>,
}

impl Check {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// All checks of a self-test, in the order they ran.
#[derive(Debug, Default)]
pub struct SelfTestReport {
    pub checks: Vec<Check>,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(Check::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed())
    }
}

pub fn check_config(cfg: &Config) -> Result<String, StartupError> {
    cfg.validate()?;
    Ok("configuration is valid".to_string())
}

pub fn check_save_path(path: &Path) -> Result<String, StartupError> {
    let shown = path.display().to_string();
    let metadata = std::fs::metadata(path).map_err(|_| StartupError::SavePathMissing(shown.clone()))?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(StartupError::SavePathUnusable(shown));
    }
    Ok(format!("{} is usable", shown))
}

/// Opens an existing database read-only; a missing one is created on first run.
pub fn check_database(path: &Path) -> Result<String, StartupError> {
    if !path.exists() {
        return Ok(format!("{} will be created on first run", path.display()));
    }
    let store = JobStore::open_read_only(path)?;
    let jobs = store.list_jobs()?;
    Ok(format!("{} holds {} job(s)", path.display(), jobs.len()))
}

async fn check_tool(program: &str, probe_args: &[&str]) -> Result<String, StartupError> {
    if is_available(program, probe_args).await {
        Ok(format!("{} found", program))
    } else {
        Err(StartupError::ToolUnavailable(program.to_string()))
    }
}

fn encoder_probe_args(method: CompressMethod) -> &'static [&'static str] {
    match method {
        CompressMethod::Handbrake => &["--version"],
        CompressMethod::Ffmpeg => &["-version"],
    }
}

fn eject_tool() -> Option<(&'static str, &'static [&'static str])> {
    if cfg!(target_os = "linux") {
        Some(("eject", &["--version"]))
    } else if cfg!(target_os = "macos") {
        Some(("drutil", &["version"]))
    } else {
        None
    }
}

/// Run every check; never stops at the first failure.
pub async fn run_self_test(cfg: &Config) -> SelfTestReport {
    let mut report = SelfTestReport::default();

    report.checks.push(Check {
        name: "config",
        outcome: check_config(cfg),
    });
    report.checks.push(Check {
        name: "save path",
        outcome: check_save_path(&cfg.makemkv.save_path),
    });
    report.checks.push(Check {
        name: "database",
        outcome: check_database(&cfg.database.path),
    });
    report.checks.push(Check {
        name: "makemkvcon",
        outcome: check_tool(&cfg.makemkv.binary, &[]).await,
    });
    report.checks.push(Check {
        name: "encoder",
        outcome: check_tool(
            &cfg.compress.effective_binary(),
            encoder_probe_args(cfg.compress.method),
        )
        .await,
    });
    if cfg.makemkv.eject {
        if let Some((tool, args)) = eject_tool() {
            report.checks.push(Check {
                name: "eject",
                outcome: check_tool(tool, args).await,
            });
        }
    }

    for check in &report.checks {
        match &check.outcome {
            Ok(detail) => info!(check = check.name, "PASS: {}", detail),
            Err(e) => warn!(check = check.name, "FAIL: {}", e),
        }
    }
    report
}
