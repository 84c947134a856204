//! Opening the drive tray after a disc is done.

use crate::process::{run_supervised, ProcessError, ToolCommand};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const EJECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum EjectError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Ejecting is not supported on {0}")]
    Unsupported(&'static str),
}

/// Opens the tray of the drive at `location`.
#[async_trait]
pub trait DriveEjector: Send + Sync {
    async fn eject(&self, location: &str) -> Result<(), EjectError>;
}

/// Uses the platform's eject tool: `eject -vm <location>` on Linux,
/// `drutil eject <location>` on macOS. Other platforms, Windows included,
/// get [`EjectError::Unsupported`] and the tray stays closed.
#[derive(Debug, Clone, Default)]
pub struct SystemEjector;

/// Command that ejects `location` on this platform, if there is one.
pub fn eject_command(location: &str) -> Option<ToolCommand> {
    let cmd = if cfg!(target_os = "linux") {
        ToolCommand::new("eject").arg("-vm").arg(location)
    } else if cfg!(target_os = "macos") {
        ToolCommand::new("drutil").arg("eject").arg(location)
    } else {
        return None;
    };
    Some(cmd.timeout(EJECT_TIMEOUT))
}

#[async_trait]
impl DriveEjector for SystemEjector {
    async fn eject(&self, location: &str) -> Result<(), EjectError> {
        let cmd = eject_command(location).ok_or(EjectError::Unsupported(std::env::consts::OS))?;
        run_supervised(&cmd).await?;
        debug!(location, "drive ejected");
        Ok(())
    }
}
