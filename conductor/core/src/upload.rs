//! Upload Tracker
//!
//! Drives one upload at a time with a cosmetic progress readout. The
//! transport reports no progress, so a ticker advances the percentage by a
//! fixed step up to a cap below 100 while the real call runs.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──begin──> Uploading ──ok──> Settling ──settle delay──> Idle (Completed)
//!                     │
//!                     └──err──> Failed ──retry──> Uploading
//! ```
//!
//! Progress resets to 0 on every `begin`, never decreases while uploading,
//! and reaches 100 only when the upload is confirmed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ChatConfig;
use crate::files::FileHandle;
use crate::network::{NetworkClient, NetworkError, Transport};
use crate::timer::{Generation, ScheduledTask};

/// Errors from selecting or retrying an upload
#[derive(Debug, Error)]
pub enum UploadError {
    /// Retry requested but no file was ever selected
    #[error("no file selected")]
    NoFileSelected,

    /// Retry requested while the last upload has not failed
    #[error("nothing to retry")]
    NothingToRetry,

    /// The selected file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file type is not accepted
    #[error("unsupported file type: {name} (accepted: .txt, .pdf, .doc, .docx, .json)")]
    UnsupportedType {
        /// Selected file name
        name: String,
    },
}

/// Progress simulation settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadSettings {
    /// Delay between progress steps
    pub tick: Duration,
    /// Percentage added per step
    pub step: u8,
    /// Simulated progress never passes this before confirmation
    pub cap: u8,
    /// How long 100% stays visible before completion is reported
    pub settle: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            step: 20,
            cap: 90,
            settle: Duration::from_millis(500),
        }
    }
}

impl UploadSettings {
    /// Extract upload settings from `ChatConfig`
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            tick: config.upload_tick,
            step: config.upload_step_percent,
            cap: config.upload_cap_percent,
            settle: config.upload_settle,
        }
    }

    /// Next simulated percentage after one tick
    #[must_use]
    pub fn advance(&self, current: u8) -> u8 {
        current.saturating_add(self.step).min(self.cap).max(current)
    }
}

/// Where the current upload stands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum UploadPhase {
    /// Nothing in flight
    #[default]
    Idle,
    /// Transfer running, progress simulated
    Uploading,
    /// Confirmed; holding 100% before reporting completion
    Settling,
    /// Transfer failed; retry available
    Failed,
}

/// Upload progress as shown to the user
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadState {
    /// Name of the file being uploaded
    pub filename: Option<String>,
    /// Displayed progress (0-100)
    pub progress_percent: u8,
    /// Error of the last attempt
    pub error: Option<String>,
    /// Selected file, kept for retry
    pub file_handle: Option<FileHandle>,
    /// Lifecycle phase
    pub phase: UploadPhase,
}

impl UploadState {
    /// Whether a retry is available
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.phase == UploadPhase::Failed && self.file_handle.is_some()
    }
}

/// Something the owner should show
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadNotice {
    /// Displayed progress changed
    Progress {
        /// File being uploaded
        filename: String,
        /// New percentage
        percent: u8,
    },
    /// The attempt failed; retry is available
    Failed {
        /// File that failed
        filename: String,
        /// Error description
        error: String,
    },
    /// The upload succeeded and the display settled
    Completed {
        /// File that was uploaded
        filename: String,
    },
}

#[derive(Debug)]
enum UploadEvent {
    Tick(Generation),
    Finished(Generation, Result<(), NetworkError>),
    Settled(Generation),
}

impl UploadEvent {
    fn generation(&self) -> Generation {
        match self {
            Self::Tick(g) | Self::Finished(g, _) | Self::Settled(g) => *g,
        }
    }
}

/// Tracks a single in-flight upload
pub struct UploadTracker<T: Transport + 'static> {
    client: Arc<NetworkClient<T>>,
    settings: UploadSettings,
    state: UploadState,
    generation: Generation,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: mpsc::UnboundedReceiver<UploadEvent>,
    ticker: ScheduledTask,
    transfer: ScheduledTask,
    settle: ScheduledTask,
}

impl<T: Transport + 'static> UploadTracker<T> {
    /// Create a tracker sharing the given client
    pub fn new(client: Arc<NetworkClient<T>>, settings: UploadSettings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            client,
            settings,
            state: UploadState::default(),
            generation: Generation::default(),
            events_tx,
            events_rx,
            ticker: ScheduledTask::idle("upload-progress"),
            transfer: ScheduledTask::idle("upload-transfer"),
            settle: ScheduledTask::idle("upload-settle"),
        }
    }

    /// Current upload state
    #[must_use]
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Whether an upload is running or settling
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state.phase,
            UploadPhase::Uploading | UploadPhase::Settling
        )
    }

    /// Start uploading `file`, superseding anything in flight
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin(&mut self, file: FileHandle) {
        self.stop_tasks();
        let generation = self.generation.next();
        let filename = file.name().to_string();

        tracing::info!(
            file = %filename,
            bytes = file.len(),
            generation = generation.value(),
            "Upload started"
        );

        self.state = UploadState {
            filename: Some(filename),
            progress_percent: 0,
            error: None,
            file_handle: Some(file.clone()),
            phase: UploadPhase::Uploading,
        };

        let tx = self.events_tx.clone();
        let tick = self.settings.tick.max(Duration::from_millis(1));
        self.ticker = ScheduledTask::spawn("upload-progress", async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            loop {
                interval.tick().await;
                if tx.send(UploadEvent::Tick(generation)).is_err() {
                    return;
                }
            }
        });

        let tx = self.events_tx.clone();
        let client = Arc::clone(&self.client);
        self.transfer = ScheduledTask::spawn("upload-transfer", async move {
            let result = client.upload(&file).await;
            let _ = tx.send(UploadEvent::Finished(generation, result));
        });
    }

    /// Re-send the previously selected file
    ///
    /// # Errors
    ///
    /// [`UploadError::NoFileSelected`] if no file was ever selected,
    /// [`UploadError::NothingToRetry`] if the last attempt did not fail.
    pub fn retry(&mut self) -> Result<(), UploadError> {
        let file = self
            .state
            .file_handle
            .clone()
            .ok_or(UploadError::NoFileSelected)?;
        if self.state.phase != UploadPhase::Failed {
            return Err(UploadError::NothingToRetry);
        }
        tracing::info!(file = file.name(), "Retrying upload");
        self.begin(file);
        Ok(())
    }

    /// Stop tracking and discard state
    pub fn cancel(&mut self) {
        if self.state.phase != UploadPhase::Idle {
            tracing::debug!(file = ?self.state.filename, "Upload tracking cancelled");
        }
        self.stop_tasks();
        self.generation.next();
        self.state = UploadState::default();
    }

    /// Wait for the next thing worth showing
    ///
    /// Returns `None` when nothing is in flight. Cancel safe.
    pub async fn next_event(&mut self) -> Option<UploadNotice> {
        while self.is_active() {
            let event = self.events_rx.recv().await?;
            if let Some(notice) = self.apply(event) {
                return Some(notice);
            }
        }
        None
    }

    fn apply(&mut self, event: UploadEvent) -> Option<UploadNotice> {
        if event.generation() != self.generation {
            tracing::trace!(
                stale = event.generation().value(),
                current = self.generation.value(),
                "Dropping stale upload event"
            );
            return None;
        }
        let filename = self.state.filename.clone().unwrap_or_default();

        match (event, self.state.phase) {
            (UploadEvent::Tick(_), UploadPhase::Uploading) => {
                let next = self.settings.advance(self.state.progress_percent);
                if next == self.state.progress_percent {
                    return None;
                }
                self.state.progress_percent = next;
                Some(UploadNotice::Progress {
                    filename,
                    percent: next,
                })
            }
            (UploadEvent::Finished(generation, Ok(())), UploadPhase::Uploading) => {
                self.ticker.cancel();
                self.state.progress_percent = 100;
                self.state.phase = UploadPhase::Settling;

                let tx = self.events_tx.clone();
                let settle = self.settings.settle;
                self.settle = ScheduledTask::spawn("upload-settle", async move {
                    tokio::time::sleep(settle).await;
                    let _ = tx.send(UploadEvent::Settled(generation));
                });
                Some(UploadNotice::Progress {
                    filename,
                    percent: 100,
                })
            }
            (UploadEvent::Finished(_, Err(error)), UploadPhase::Uploading) => {
                self.ticker.cancel();
                let message = error.to_string();
                tracing::warn!(file = %filename, error = %message, "Upload failed");
                self.state.phase = UploadPhase::Failed;
                self.state.error = Some(message.clone());
                Some(UploadNotice::Failed {
                    filename,
                    error: message,
                })
            }
            (UploadEvent::Settled(_), UploadPhase::Settling) => {
                tracing::info!(file = %filename, "Upload complete");
                self.stop_tasks();
                self.state = UploadState::default();
                Some(UploadNotice::Completed { filename })
            }
            _ => None,
        }
    }

    fn stop_tasks(&mut self) {
        self.ticker.cancel();
        self.transfer.cancel();
        self.settle.cancel();
    }
}
