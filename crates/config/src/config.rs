//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is not usable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Placeholder replaced with the source path in encoder arguments.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced with the destination path in encoder arguments.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// MakeMKV ripping configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MakeMkvConfig {
    /// makemkvcon executable
    #[serde(default = "default_makemkv_binary")]
    pub binary: String,
    /// Root directory; each disc gets its own folder below it
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,
    /// Titles shorter than this are treated as previews/junk
    #[serde(default = "default_min_length_secs")]
    pub min_length_secs: u64,
    /// Read cache handed to makemkvcon (MB)
    #[serde(default = "default_cache_mb")]
    pub cache_mb: u32,
    /// Open the drive tray once every title on a disc was processed
    #[serde(default = "default_true")]
    pub eject: bool,
    /// Wall-clock limit per rip (0 = unlimited)
    #[serde(default = "default_rip_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_makemkv_binary() -> String {
    "makemkvcon".to_string()
}

fn default_save_path() -> PathBuf {
    PathBuf::from("/srv/rips")
}

fn default_min_length_secs() -> u64 {
    600
}

fn default_cache_mb() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_rip_timeout_secs() -> u64 {
    4 * 60 * 60
}

impl Default for MakeMkvConfig {
    fn default() -> Self {
        Self {
            binary: default_makemkv_binary(),
            save_path: default_save_path(),
            min_length_secs: default_min_length_secs(),
            cache_mb: default_cache_mb(),
            eject: true,
            timeout_secs: default_rip_timeout_secs(),
        }
    }
}

/// External encoder used for compression
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressMethod {
    Handbrake,
    Ffmpeg,
}

impl Default for CompressMethod {
    fn default() -> Self {
        Self::Handbrake
    }
}

impl CompressMethod {
    /// Executable name used when `compress.binary` is not set.
    pub fn default_binary(&self) -> &'static str {
        match self {
            CompressMethod::Handbrake => "HandBrakeCLI",
            CompressMethod::Ffmpeg => "ffmpeg",
        }
    }

    /// Argument template used when `compress.args` is empty.
    pub fn default_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            CompressMethod::Handbrake => &[
                "-i",
                INPUT_PLACEHOLDER,
                "-o",
                OUTPUT_PLACEHOLDER,
                "--preset",
                "Fast 1080p30",
                "--all-audio",
                "--all-subtitles",
            ],
            CompressMethod::Ffmpeg => &[
                "-nostdin",
                "-i",
                INPUT_PLACEHOLDER,
                "-map",
                "0",
                "-c:v",
                "libx264",
                "-crf",
                "20",
                "-preset",
                "slow",
                "-c:a",
                "copy",
                "-c:s",
                "copy",
                OUTPUT_PLACEHOLDER,
            ],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressConfig {
    #[serde(default)]
    pub method: CompressMethod,
    /// Encoder executable (defaults per method)
    #[serde(default)]
    pub binary: Option<String>,
    /// Argument template containing `{input}` and `{output}`
    #[serde(default)]
    pub args: Vec<String>,
    /// Scheduling priority passed to `nice`
    #[serde(default = "default_nice")]
    pub nice: i32,
    /// Container extension of the compressed file
    #[serde(default = "default_format")]
    pub format: String,
    /// Where compressed files go (defaults to the disc folder)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Delete the rip once compression succeeded
    #[serde(default)]
    pub remove_source: bool,
    /// Wall-clock limit per compression (0 = unlimited)
    #[serde(default = "default_compress_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_nice() -> i32 {
    15
}

fn default_format() -> String {
    "mp4".to_string()
}

fn default_compress_timeout_secs() -> u64 {
    12 * 60 * 60
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            method: CompressMethod::default(),
            binary: None,
            args: Vec::new(),
            nice: default_nice(),
            format: default_format(),
            output_dir: None,
            remove_source: false,
            timeout_secs: default_compress_timeout_secs(),
        }
    }
}

impl CompressConfig {
    /// Executable to run, falling back to the method default.
    pub fn effective_binary(&self) -> String {
        self.binary
            .clone()
            .unwrap_or_else(|| self.method.default_binary().to_string())
    }

    /// Argument template, falling back to the method default.
    pub fn effective_args(&self) -> Vec<String> {
        if self.args.is_empty() {
            self.method.default_args()
        } else {
            self.args.clone()
        }
    }
}

/// Classes of job events an operator can subscribe to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// A title finished ripping
    Rip,
    /// A job finished compressing
    Compress,
    /// A rip or compression failed
    Failure,
}

impl std::str::FromStr for EventClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rip" => Ok(EventClass::Rip),
            "compress" => Ok(EventClass::Compress),
            "failure" | "fail" => Ok(EventClass::Failure),
            other => Err(ConfigError::Invalid(format!(
                "unknown notification class '{}'",
                other
            ))),
        }
    }
}

/// Webhook notification channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    /// Event classes that reach the channels
    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<EventClass>,
    /// Emit notifications as log lines
    #[serde(default = "default_true")]
    pub log: bool,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

fn default_notify_on() -> Vec<EventClass> {
    vec![EventClass::Rip, EventClass::Compress, EventClass::Failure]
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notify_on: default_notify_on(),
            log: true,
            webhook: None,
        }
    }
}

/// Job database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("autorip.sqlite")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// FileBot post-processing flag, recorded on each job
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FilebotConfig {
    #[serde(default)]
    pub enable: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub makemkv: MakeMkvConfig,
    #[serde(default)]
    pub compress: CompressConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub filebot: FilebotConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - AUTORIP_SAVE_PATH -> makemkv.save_path
    /// - AUTORIP_DB_PATH -> database.path
    /// - AUTORIP_MIN_LENGTH_SECS -> makemkv.min_length_secs
    /// - AUTORIP_EJECT -> makemkv.eject
    /// - AUTORIP_NICE -> compress.nice
    /// - AUTORIP_NOTIFY_ON -> notification.notify_on (comma separated)
    ///
    /// Unparseable values are ignored and the file value is kept.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AUTORIP_SAVE_PATH") {
            if !val.is_empty() {
                self.makemkv.save_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AUTORIP_DB_PATH") {
            if !val.is_empty() {
                self.database.path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AUTORIP_MIN_LENGTH_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.makemkv.min_length_secs = secs;
            }
        }

        if let Ok(val) = env::var("AUTORIP_EJECT") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.makemkv.eject = true,
                "false" | "0" | "no" => self.makemkv.eject = false,
                _ => {}
            }
        }

        if let Ok(val) = env::var("AUTORIP_NICE") {
            if let Ok(nice) = val.parse::<i32>() {
                self.compress.nice = nice;
            }
        }

        if let Ok(val) = env::var("AUTORIP_NOTIFY_ON") {
            let parsed: Result<Vec<EventClass>, _> = val
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect();
            if let Ok(classes) = parsed {
                self.notification.notify_on = classes;
            }
        }
    }

    /// Reject values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.makemkv.save_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("makemkv.save_path is empty".into()));
        }
        if !(-20..=19).contains(&self.compress.nice) {
            return Err(ConfigError::Invalid(format!(
                "compress.nice must be within -20..=19, got {}",
                self.compress.nice
            )));
        }
        let format = self.compress.format.trim_start_matches('.');
        if format.is_empty() || format.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "compress.format '{}' is not a file extension",
                self.compress.format
            )));
        }
        let args = self.compress.effective_args();
        for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
            if !args.iter().any(|a| a.contains(placeholder)) {
                return Err(ConfigError::Invalid(format!(
                    "compress.args must reference {}",
                    placeholder
                )));
            }
        }
        if let Some(webhook) = &self.notification.webhook {
            if !(webhook.url.starts_with("http://") || webhook.url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "notification.webhook.url '{}' is not an http(s) URL",
                    webhook.url
                )));
            }
        }
        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
