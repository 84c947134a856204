//! CLI entry point for autorip
//!
//! Parses the mode flags, installs logging and Ctrl-C handling, and runs one
//! invocation.

use autorip::{DiscType, Mode, ModeFlags};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// autorip - rip discs with MakeMKV and compress them with HandBrake or FFmpeg
#[derive(Parser, Debug)]
#[command(name = "autorip")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rip inserted discs with makemkvcon
    #[arg(long)]
    rip: bool,

    /// Compress ripped titles (may be combined with --rip)
    #[arg(long)]
    compress: bool,

    /// Mark ripped titles as done without compressing them
    #[arg(long)]
    skip_compress: bool,

    /// Rip, then compress
    #[arg(long)]
    all: bool,

    /// Check configuration, database and external tools, then exit
    #[arg(long)]
    test: bool,

    /// Classify every disc as `tv` or `movie` instead of guessing
    #[arg(long, value_name = "tv|movie", alias = "force_db")]
    force_db: Option<DiscType>,

    /// Log debug output
    #[arg(long, conflicts_with = "silent")]
    debug: bool,

    /// Only log errors
    #[arg(long)]
    silent: bool,

    /// Path to the configuration file
    #[arg(short, long, default_value = "settings.toml")]
    config: PathBuf,
}

impl Args {
    fn mode_flags(&self) -> ModeFlags {
        ModeFlags {
            rip: self.rip,
            compress: self.compress,
            skip_compress: self.skip_compress,
            all: self.all,
            test: self.test,
        }
    }

    fn default_log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.silent {
            "error"
        } else {
            "info"
        }
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.default_log_level());

    let mode = match Mode::from_flags(args.mode_flags()) {
        Ok(mode) => mode,
        Err(e) => {
            let e = autorip::RunError::from(e);
            error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    info!(config = %args.config.display(), ?mode, "autorip starting");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("shutdown requested; finishing the current operation");
                cancel.cancel();
            }
        });
    }

    match autorip::run(&args.config, mode, args.force_db, cancel).await {
        Ok(summary) => {
            if let Some(report) = &summary.self_test {
                info!(checks = report.checks.len(), "self-test passed");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
