//! Completion and failure notifications.
//!
//! The [`Notifier`] is stateless: coordinators hand it a [`JobEvent`] after
//! the corresponding status change is persisted, and it forwards the event to
//! every channel when the event's class is enabled. Channel errors are logged
//! and dropped.

pub mod webhook;

pub use webhook::WebhookChannel;

use crate::jobs::{Job, JobStatus};
use async_trait::async_trait;
use autorip_config::{EventClass, NotificationConfig};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Error type for notification delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Channel rejected the notification: {0}")]
    Rejected(String),
}

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    RipComplete,
    RipFailed,
    CompressComplete,
    CompressFailed,
}

impl JobEventKind {
    /// Notification class the event belongs to.
    pub fn class(&self) -> EventClass {
        match self {
            JobEventKind::RipComplete => EventClass::Rip,
            JobEventKind::CompressComplete => EventClass::Compress,
            JobEventKind::RipFailed | JobEventKind::CompressFailed => EventClass::Failure,
        }
    }

    fn headline(&self) -> &'static str {
        match self {
            JobEventKind::RipComplete => "Rip complete",
            JobEventKind::RipFailed => "Rip failed",
            JobEventKind::CompressComplete => "Compression complete",
            JobEventKind::CompressFailed => "Compression failed",
        }
    }
}

/// A notification about one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job_id: i64,
    pub disc_title: String,
    pub filename: Option<String>,
    pub status: JobStatus,
    pub message: String,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: &Job, message: impl Into<String>) -> Self {
        Self {
            kind,
            job_id: job.id,
            disc_title: job.disc_title.clone(),
            filename: job.filename.clone(),
            status: job.status,
            message: message.into(),
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match &self.filename {
            Some(name) => format!(
                "{}: {} ({}) - {}",
                self.kind.headline(),
                self.disc_title,
                name,
                self.message
            ),
            None => format!("{}: {} - {}", self.kind.headline(), self.disc_title, self.message),
        }
    }
}

/// Somewhere notifications can be delivered.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &JobEvent) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &JobEvent) -> Result<(), NotifyError> {
        match event.kind.class() {
            EventClass::Failure => error!(job_id = event.job_id, "{}", event.summary()),
            _ => info!(job_id = event.job_id, "{}", event.summary()),
        }
        Ok(())
    }
}

/// Fans events out to channels, filtered by class.
#[derive(Clone)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
    enabled: HashSet<EventClass>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("channels", &self.channels.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Notifier {
    pub fn new(
        channels: Vec<Arc<dyn NotificationChannel>>,
        enabled: impl IntoIterator<Item = EventClass>,
    ) -> Self {
        Self {
            channels,
            enabled: enabled.into_iter().collect(),
        }
    }

    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), [])
    }

    /// Channels and classes from `[notification]`.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
        if config.log {
            channels.push(Arc::new(LogChannel));
        }
        if let Some(webhook) = &config.webhook {
            channels.push(Arc::new(WebhookChannel::new(webhook)?));
        }
        Ok(Self::new(channels, config.notify_on.iter().copied()))
    }

    pub fn is_enabled(&self, class: EventClass) -> bool {
        self.enabled.contains(&class)
    }

    /// Deliver `event` to every channel if its class is enabled.
    ///
    /// Returns how many channels accepted it.
    pub async fn notify(&self, event: &JobEvent) -> usize {
        if !self.is_enabled(event.kind.class()) {
            return 0;
        }

        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    channel = channel.name(),
                    job_id = event.job_id,
                    error = %e,
                    "notification delivery failed"
                ),
            }
        }
        delivered
    }
}
