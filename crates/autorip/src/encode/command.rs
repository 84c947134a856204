//! Template-driven encoder: HandBrakeCLI or ffmpeg, run at reduced priority.

use super::{compressed_output_path, EncodeError, Encoder};
use crate::process::{run_supervised, ToolCommand};
use async_trait::async_trait;
use autorip_config::{CompressConfig, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Build the encoder invocation for one file.
///
/// Every template argument equal to `{input}`/`{output}` becomes the path
/// itself; arguments merely containing a placeholder get it substituted
/// textually. The result runs under `nice` with the configured timeout.
pub fn build_encode_command(
    binary: &str,
    template: &[String],
    source: &Path,
    output: &Path,
    nice: i32,
    timeout: Duration,
) -> ToolCommand {
    let args = template.iter().map(|arg| substitute(arg, source, output));
    ToolCommand::new(binary).args(args).nice(nice).timeout(timeout)
}

fn substitute(arg: &str, source: &Path, output: &Path) -> OsString {
    if arg == INPUT_PLACEHOLDER {
        return source.as_os_str().to_owned();
    }
    if arg == OUTPUT_PLACEHOLDER {
        return output.as_os_str().to_owned();
    }
    if arg.contains(INPUT_PLACEHOLDER) || arg.contains(OUTPUT_PLACEHOLDER) {
        return OsString::from(
            arg.replace(INPUT_PLACEHOLDER, &source.to_string_lossy())
                .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy()),
        );
    }
    OsString::from(arg)
}

/// [`Encoder`] driven by `[compress]` settings.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    binary: String,
    template: Vec<String>,
    nice: i32,
    format: String,
    output_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandEncoder {
    pub fn new(config: &CompressConfig) -> Self {
        Self {
            binary: config.effective_binary(),
            template: config.effective_args(),
            nice: config.nice,
            format: config.format.clone(),
            output_dir: config.output_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

#[async_trait]
impl Encoder for CommandEncoder {
    fn output_path_for(&self, source: &Path) -> PathBuf {
        compressed_output_path(source, self.output_dir.as_deref(), &self.format)
    }

    async fn compress(&self, source: &Path, output: &Path) -> Result<(), EncodeError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = build_encode_command(
            &self.binary,
            &self.template,
            source,
            output,
            self.nice,
            self.timeout,
        );
        info!(
            encoder = %self.binary,
            source = %source.display(),
            output = %output.display(),
            "compressing"
        );

        if let Err(e) = run_supervised(&cmd).await {
            // Partial output from a failed run would make the next sweep skip the job.
            if output.exists() {
                if let Err(rm) = tokio::fs::remove_file(output).await {
                    warn!(output = %output.display(), error = %rm, "failed to remove partial output");
                }
            }
            return Err(e.into());
        }

        if !output.exists() {
            return Err(EncodeError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}
