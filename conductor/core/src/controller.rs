//! Turn Controller - The Orchestration Core
//!
//! Runs one question/answer cycle at a time:
//! - sends the question through the [`NetworkClient`]
//! - appends both sides of the turn to the [`MessageStore`]
//! - reveals the answer with the [`TypewriterScheduler`]
//! - tracks document uploads with the [`UploadTracker`]
//!
//! # State Machine
//!
//! ```text
//!          submit             answer              reveal done
//! Idle ─────────────> AwaitingResponse ─────────> Streaming ─────────> Idle
//!                            │
//!                            └──failure──> Error ──(immediately)──> Idle
//! ```
//!
//! `clear` is valid from any phase and always lands in `Idle`.
//!
//! # Design Philosophy
//!
//! The controller is UI-agnostic. It pushes [`ChatUpdate`] values to whatever
//! surface is listening and exposes read-only accessors for renderers that
//! prefer to pull. All state lives here and changes only inside `&mut self`
//! methods; background tasks (the query call, typewriter ticks, upload
//! timers) just deliver events that [`TurnController::step`] applies.

use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::ChatConfig;
use crate::files::FileHandle;
use crate::messages::{AuxiliaryData, ChatUpdate, MessageId, MessageRole, TurnPhase};
use crate::network::{Answer, NetworkClient, NetworkError, Transport};
use crate::store::{ConversationState, Message, MessageStore, StoreError};
use crate::timer::{Generation, ScheduledTask};
use crate::typewriter::{RevealFrame, StreamHandle, TypewriterScheduler};
use crate::upload::{UploadError, UploadNotice, UploadSettings, UploadState, UploadTracker};

/// Text shown when a query fails
pub const QUERY_ERROR_MESSAGE: &str =
    "Sorry, I encountered an error while processing your request. Please try again.";

/// Why a submission was not accepted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Blank input; ignored
    #[error("empty submission")]
    EmptySubmission,

    /// A turn is already in progress
    #[error("a turn is already in progress ({phase:?})")]
    Busy {
        /// Phase at the time of the attempt
        phase: TurnPhase,
    },

    /// The store rejected the message
    #[error(transparent)]
    Store(#[from] StoreError),
}

type QueryResult = Result<Answer, NetworkError>;

/// The in-flight query of the current turn
struct PendingQuery {
    generation: Generation,
    rx: oneshot::Receiver<QueryResult>,
    task: ScheduledTask,
}

/// Something that happened in the background
enum Event {
    Query(Generation, Result<QueryResult, oneshot::error::RecvError>),
    Frame(RevealFrame),
    Upload(UploadNotice),
}

/// Turn controller - headless conversation core
pub struct TurnController<T: Transport + 'static> {
    /// Configuration
    config: ChatConfig,
    /// Shared network client
    client: Arc<NetworkClient<T>>,
    /// Conversation log
    store: MessageStore,
    /// Answer reveal
    typewriter: TypewriterScheduler,
    /// Document uploads
    uploads: UploadTracker<T>,
    /// Current turn phase
    phase: TurnPhase,
    /// Query awaiting an answer
    pending_query: Option<PendingQuery>,
    /// Bumped on every turn and on clear
    generation: Generation,
    /// Reveal of the active stream message
    stream_handle: Option<StreamHandle>,
    /// Last successfully uploaded file
    uploaded_file: Option<String>,
    /// Whether the conversation has begun
    started: bool,
    /// Channel to the rendering surface
    tx: mpsc::UnboundedSender<ChatUpdate>,
}

impl<T: Transport + 'static> TurnController<T> {
    /// Create a controller around a transport
    pub fn new(transport: T, config: ChatConfig, tx: mpsc::UnboundedSender<ChatUpdate>) -> Self {
        let client = Arc::new(NetworkClient::from_config(transport, &config));
        Self::with_client(client, config, tx)
    }

    /// Create a controller around an existing client
    pub fn with_client(
        client: Arc<NetworkClient<T>>,
        config: ChatConfig,
        tx: mpsc::UnboundedSender<ChatUpdate>,
    ) -> Self {
        let typewriter = TypewriterScheduler::new(config.reveal_interval);
        let uploads = UploadTracker::new(Arc::clone(&client), UploadSettings::from_config(&config));
        Self {
            config,
            client,
            store: MessageStore::new(),
            typewriter,
            uploads,
            phase: TurnPhase::Idle,
            pending_query: None,
            generation: Generation::default(),
            stream_handle: None,
            uploaded_file: None,
            started: false,
            tx,
        }
    }

    // ========================================================================
    // Read access
    // ========================================================================

    /// Current turn phase
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Network client shared with the upload tracker
    #[must_use]
    pub fn client(&self) -> &Arc<NetworkClient<T>> {
        &self.client
    }

    /// All messages in display order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.store.all()
    }

    /// Snapshot of messages and the active stream target
    #[must_use]
    pub fn conversation(&self) -> ConversationState {
        self.store.snapshot()
    }

    /// Assistant message currently being revealed
    #[must_use]
    pub fn active_stream(&self) -> Option<&MessageId> {
        self.store.active_stream()
    }

    /// What a renderer should show for a message right now
    ///
    /// User messages and finished answers are shown in full; the active
    /// stream shows its revealed prefix.
    #[must_use]
    pub fn visible_content(&self, id: &MessageId) -> Option<&str> {
        let message = self.store.get(id)?;
        if message.role == MessageRole::User || !self.store.is_streaming(id) {
            return Some(message.content.as_str());
        }
        Some(self.typewriter.revealed().unwrap_or(""))
    }

    /// Raw data attached to the most recent answer
    #[must_use]
    pub fn last_answer_data(&self) -> Option<&AuxiliaryData> {
        self.store
            .last_assistant()
            .and_then(|m| m.auxiliary_data.as_ref())
    }

    /// Current upload state
    #[must_use]
    pub fn upload_state(&self) -> &UploadState {
        self.uploads.state()
    }

    /// Last successfully uploaded file, until the conversation is cleared
    #[must_use]
    pub fn uploaded_file(&self) -> Option<&str> {
        self.uploaded_file.as_deref()
    }

    /// Whether the first question has been asked
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Whether anything is waiting to be applied by [`TurnController::step`]
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.pending_query.is_some() || self.typewriter.is_running() || self.uploads.is_active()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Ask a question
    ///
    /// The text is stored and sent exactly as given.
    ///
    /// # Errors
    ///
    /// [`SubmitError::EmptySubmission`] for blank input and
    /// [`SubmitError::Busy`] while a turn is in progress; neither changes
    /// any state or makes a network call.
    pub fn submit(&mut self, text: &str) -> Result<MessageId, SubmitError> {
        if text.trim().is_empty() {
            return Err(SubmitError::EmptySubmission);
        }
        if !self.phase.accepts_input() {
            tracing::debug!(phase = ?self.phase, "Rejecting submission while busy");
            return Err(SubmitError::Busy { phase: self.phase });
        }

        let message = Message::user(text);
        let id = message.id.clone();
        self.store.append(message)?;
        self.started = true;
        self.send(ChatUpdate::MessageAppended {
            id: id.clone(),
            role: MessageRole::User,
            content: text.to_string(),
            auxiliary_data: None,
            streaming: false,
        });
        self.set_phase(TurnPhase::AwaitingResponse);

        let generation = self.generation.next();
        let (result_tx, rx) = oneshot::channel();
        let client = Arc::clone(&self.client);
        let query = text.to_string();
        let task = ScheduledTask::spawn("query", async move {
            let result = client.query(&query).await;
            let _ = result_tx.send(result);
        });
        self.pending_query = Some(PendingQuery {
            generation,
            rx,
            task,
        });

        tracing::debug!(message_id = %id, generation = generation.value(), "Query submitted");
        Ok(id)
    }

    /// Reset the conversation
    ///
    /// Cancels the pending query, the reveal, and upload tracking; none of
    /// them can change state afterwards.
    pub fn clear(&mut self) {
        if let Some(mut pending) = self.pending_query.take() {
            pending.task.cancel();
        }
        self.typewriter.cancel_all();
        self.stream_handle = None;
        self.uploads.cancel();
        self.generation.next();

        self.store.clear();
        self.uploaded_file = None;
        self.started = false;

        tracing::info!("Conversation cleared");
        self.send(ChatUpdate::Cleared);
        self.set_phase(TurnPhase::Idle);
    }

    /// Start uploading a document
    pub fn begin_upload(&mut self, file: FileHandle) {
        let filename = file.name().to_string();
        self.uploads.begin(file);
        self.send(ChatUpdate::UploadStarted { filename });
    }

    /// Re-send the file from the last failed upload
    ///
    /// # Errors
    ///
    /// See [`UploadTracker::retry`].
    pub fn retry_upload(&mut self) -> Result<(), UploadError> {
        self.uploads.retry()?;
        let filename = self.uploads.state().filename.clone().unwrap_or_default();
        self.send(ChatUpdate::UploadStarted { filename });
        Ok(())
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Wait for the next background event and apply it
    ///
    /// Returns `false` immediately when nothing is pending. Cancel safe: if
    /// the returned future is dropped before completing, no event is lost.
    pub async fn step(&mut self) -> bool {
        let event = {
            let pending = &mut self.pending_query;
            let typewriter = &mut self.typewriter;
            let uploads = &mut self.uploads;

            tokio::select! {
                Some(event) = async {
                    match pending.as_mut() {
                        Some(p) => Some(Event::Query(p.generation, (&mut p.rx).await)),
                        None => None,
                    }
                } => event,
                Some(frame) = typewriter.next_frame() => Event::Frame(frame),
                Some(notice) = uploads.next_event() => Event::Upload(notice),
                else => return false,
            }
        };

        self.apply(event);
        true
    }

    /// Apply everything that is ready without waiting
    ///
    /// Returns whether there was any activity.
    pub fn poll(&mut self) -> bool {
        let mut activity = false;
        while let Some(true) = self.step().now_or_never() {
            activity = true;
        }
        activity
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Query(generation, received) => {
                let Some(pending) = self.pending_query.take() else {
                    return;
                };
                if pending.generation != generation {
                    tracing::trace!("Dropping stale query result");
                    return;
                }
                match received {
                    Ok(Ok(answer)) => self.handle_answer(answer),
                    Ok(Err(error)) => self.handle_query_failure(&error.to_string()),
                    Err(_) => self.handle_query_failure("query task ended without a result"),
                }
            }
            Event::Frame(frame) => self.handle_frame(frame),
            Event::Upload(notice) => self.handle_upload(notice),
        }
    }

    fn handle_answer(&mut self, answer: Answer) {
        let message = Message::assistant(answer.answer, answer.auxiliary_data);
        let id = message.id.clone();
        let content = message.content.clone();
        let auxiliary_data = message.auxiliary_data.clone();

        if let Err(e) = self.store.append(message) {
            tracing::error!(error = %e, "Failed to store answer");
            self.set_phase(TurnPhase::Idle);
            return;
        }
        if let Err(e) = self.store.set_active_stream(&id) {
            tracing::error!(error = %e, "Failed to mark answer as streaming");
        }

        self.send(ChatUpdate::MessageAppended {
            id,
            role: MessageRole::Assistant,
            content: content.clone(),
            auxiliary_data,
            streaming: true,
        });
        self.set_phase(TurnPhase::Streaming);
        self.stream_handle = Some(self.typewriter.start(content));
    }

    fn handle_query_failure(&mut self, reason: &str) {
        tracing::warn!(reason, "Query failed");
        self.set_phase(TurnPhase::Error);

        let message = Message::assistant(QUERY_ERROR_MESSAGE, None);
        let id = message.id.clone();
        match self.store.append(message) {
            Ok(()) => self.send(ChatUpdate::MessageAppended {
                id,
                role: MessageRole::Assistant,
                content: QUERY_ERROR_MESSAGE.to_string(),
                auxiliary_data: None,
                streaming: false,
            }),
            Err(e) => tracing::error!(error = %e, "Failed to store error message"),
        }
        self.set_phase(TurnPhase::Idle);
    }

    fn handle_frame(&mut self, frame: RevealFrame) {
        if self.stream_handle != Some(frame.handle()) {
            tracing::trace!("Dropping frame from a finished reveal");
            return;
        }
        let Some(message_id) = self.store.active_stream().cloned() else {
            return;
        };

        match frame {
            RevealFrame::Progress { .. } => {
                let revealed = self.typewriter.revealed().unwrap_or("").to_string();
                self.send(ChatUpdate::Reveal {
                    message_id,
                    revealed,
                });
            }
            RevealFrame::Done { .. } => {
                self.store.clear_active_stream();
                self.stream_handle = None;
                self.send(ChatUpdate::StreamEnd { message_id });
                self.set_phase(TurnPhase::Idle);
            }
        }
    }

    fn handle_upload(&mut self, notice: UploadNotice) {
        match notice {
            UploadNotice::Progress { filename, percent } => {
                self.send(ChatUpdate::UploadProgress { filename, percent });
            }
            UploadNotice::Failed { filename, error } => {
                self.send(ChatUpdate::UploadFailed { filename, error });
            }
            UploadNotice::Completed { filename } => {
                self.uploaded_file = Some(filename.clone());
                self.send(ChatUpdate::UploadComplete { filename });
            }
        }
    }

    /// Set phase and notify the surface
    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "Turn phase changed");
        }
        self.phase = phase;
        self.send(ChatUpdate::Phase { phase });
    }

    /// Send an update to the surface
    fn send(&self, update: ChatUpdate) {
        if let Err(e) = self.tx.send(update) {
            tracing::debug!("Surface is gone, dropping update: {:?}", e.0);
        }
    }
}
