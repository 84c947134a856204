//! makemkvcon adapter.
//!
//! makemkvcon is always run in robot mode (`-r`), whose output is one record
//! per line: `KIND:field,field,"quoted, field"`.

use super::{Disc, DiscInfo, DiscTitle, RipError, Ripper};
use crate::process::{run_supervised, ToolCommand};
use async_trait::async_trait;
use autorip_config::MakeMkvConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// `CINFO` attribute holding the disc name.
const ATTR_NAME: u32 = 2;
/// `TINFO` attribute holding the runtime (`h:mm:ss`).
const ATTR_DURATION: u32 = 9;
/// `TINFO` attribute holding the output file name.
const ATTR_OUTPUT_FILENAME: u32 = 27;

/// Drive index meaning "scan every drive".
const ALL_DRIVES: &str = "disc:9999";

/// Disc listing and info reads are quick; only rips get the configured limit.
const PROBE_TIMEOUT: Duration = Duration::from_secs(300);

/// makemkvcon-backed [`Ripper`].
#[derive(Debug, Clone)]
pub struct MakeMkv {
    binary: String,
    cache_mb: u32,
    min_length_secs: u64,
    rip_timeout: Duration,
}

impl MakeMkv {
    pub fn new(config: &MakeMkvConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            cache_mb: config.cache_mb,
            min_length_secs: config.min_length_secs,
            rip_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// makemkvcon numbers titles after applying `--minlength`, so `info`
    /// and `mkv` must share the same filter for title indices to agree.
    fn base_command(&self) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .arg("-r")
            .arg(format!("--cache={}", self.cache_mb))
            .arg(format!("--minlength={}", self.min_length_secs))
    }

    /// `makemkvcon -r --cache=N --minlength=S info disc:I`
    pub fn info_command(&self, disc: &Disc) -> ToolCommand {
        self.base_command()
            .arg("info")
            .arg(format!("disc:{}", disc.index))
            .timeout(PROBE_TIMEOUT)
    }

    /// `makemkvcon -r --cache=N --minlength=S mkv disc:I <title> <dir>`
    pub fn rip_command(&self, disc: &Disc, save_dir: &Path, title_index: u32) -> ToolCommand {
        self.base_command()
            .arg("mkv")
            .arg(format!("disc:{}", disc.index))
            .arg(title_index.to_string())
            .arg(save_dir.as_os_str())
            .timeout(self.rip_timeout)
    }
}

#[async_trait]
impl Ripper for MakeMkv {
    async fn find_discs(&self) -> Result<Vec<Disc>, RipError> {
        let cmd = ToolCommand::new(&self.binary)
            .arg("-r")
            .arg("--cache=1")
            .arg("info")
            .arg(ALL_DRIVES)
            .timeout(PROBE_TIMEOUT);
        let output = run_supervised(&cmd).await?;
        let discs = parse_drive_list(&output.stdout);
        debug!(count = discs.len(), "drive scan finished");
        Ok(discs)
    }

    async fn disc_info(&self, disc: &Disc) -> Result<DiscInfo, RipError> {
        let cmd = self.info_command(disc);
        let output = run_supervised(&cmd).await?;
        Ok(parse_disc_info(&output.stdout))
    }

    async fn rip(&self, disc: &Disc, save_dir: &Path, title_index: u32) -> Result<(), RipError> {
        let cmd = self.rip_command(disc, save_dir, title_index);
        info!(disc = %disc.title, title_index, dir = %save_dir.display(), "ripping title");
        let output = run_supervised(&cmd).await?;
        if rip_succeeded(&output.stdout) {
            Ok(())
        } else {
            Err(RipError::NothingSaved(last_message(&output.stdout)))
        }
    }
}

/// Splits a robot-mode line into its kind and fields.
fn split_record(line: &str) -> Option<(&str, Vec<String>)> {
    let (kind, rest) = line.split_once(':')?;
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = rest.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    Some((kind.trim(), fields))
}

/// Discs listed by `info disc:9999`.
///
/// `DRV:index,state,unused,flags,"drive","disc title","device"`; drives
/// without a disc report an empty title.
pub fn parse_drive_list(output: &str) -> Vec<Disc> {
    output
        .lines()
        .filter_map(split_record)
        .filter(|(kind, _)| *kind == "DRV")
        .filter_map(|(_, fields)| {
            if fields.len() < 7 {
                return None;
            }
            let index = fields[0].trim().parse().ok()?;
            let title = fields[5].trim().to_string();
            if title.is_empty() {
                return None;
            }
            Some(Disc {
                title,
                index,
                location: fields[6].trim().to_string(),
            })
        })
        .collect()
}

/// Disc name and titles from `info disc:N`.
pub fn parse_disc_info(output: &str) -> DiscInfo {
    let mut name = None;
    let mut durations: BTreeMap<u32, u64> = BTreeMap::new();
    let mut filenames: BTreeMap<u32, String> = BTreeMap::new();

    for (kind, fields) in output.lines().filter_map(split_record) {
        match kind {
            "CINFO" if fields.len() >= 3 => {
                if fields[0].trim().parse::<u32>().ok() == Some(ATTR_NAME) {
                    let value = fields[2].trim();
                    if !value.is_empty() {
                        name = Some(value.to_string());
                    }
                }
            }
            "TINFO" if fields.len() >= 4 => {
                let (Ok(title), Ok(attr)) =
                    (fields[0].trim().parse::<u32>(), fields[1].trim().parse::<u32>())
                else {
                    continue;
                };
                match attr {
                    ATTR_DURATION => {
                        if let Some(secs) = parse_duration(&fields[3]) {
                            durations.insert(title, secs);
                        }
                    }
                    ATTR_OUTPUT_FILENAME => {
                        filenames.insert(title, fields[3].trim().to_string());
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let titles = filenames
        .into_iter()
        .filter(|(_, filename)| !filename.is_empty())
        .map(|(index, filename)| DiscTitle {
            index,
            filename,
            length_secs: durations.get(&index).copied().unwrap_or(0),
        })
        .collect();

    DiscInfo { name, titles }
}

/// `h:mm:ss` (or `mm:ss`) to seconds.
fn parse_duration(value: &str) -> Option<u64> {
    value
        .trim()
        .split(':')
        .try_fold(0u64, |acc, part| Some(acc * 60 + part.parse::<u64>().ok()?))
}

/// Whether the rip output reports at least one saved title.
///
/// Success is `MSG:5036,...,"Copy complete. 1 titles saved."`.
pub fn rip_succeeded(output: &str) -> bool {
    output
        .lines()
        .filter_map(split_record)
        .filter(|(kind, _)| *kind == "MSG")
        .filter_map(|(_, fields)| fields.get(3).cloned())
        .any(|text| saved_count(&text).is_some_and(|n| n > 0))
}

fn saved_count(message: &str) -> Option<u32> {
    let idx = message.find("titles saved").or_else(|| message.find("title saved"))?;
    message[..idx].split_whitespace().last()?.parse().ok()
}

/// Text of the last `MSG` line, for failure history.
fn last_message(output: &str) -> String {
    output
        .lines()
        .filter_map(split_record)
        .filter(|(kind, _)| *kind == "MSG")
        .filter_map(|(_, fields)| fields.get(3).cloned())
        .last()
        .unwrap_or_else(|| "makemkvcon reported nothing".to_string())
}
