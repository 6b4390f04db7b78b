//! Conversation Messages
//!
//! Identifiers, roles, turn phases, and the updates the controller pushes to
//! whatever is rendering the conversation (terminal, web view, test harness).
//!
//! # Design Philosophy
//!
//! The controller owns all conversation state. Renderers either pull snapshots
//! from it or listen to [`ChatUpdate`] values on a channel; they never mutate
//! anything themselves.

use serde::{Deserialize, Serialize};

/// A single auxiliary record (one JSON object from the answer's `data` array)
pub type AuxRecord = serde_json::Map<String, serde_json::Value>;

/// Message identifier
///
/// Assigned once at creation from a process-wide monotonic counter, so ids are
/// unique within (and across) conversations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("msg_{timestamp}_{count}"))
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person asking questions
    User,
    /// The answering service (or its local fallback)
    Assistant,
}

impl MessageRole {
    /// Label used in transcripts and exports
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Assistant",
        }
    }
}

/// Structured payload that accompanies an answer
///
/// Shown separately from the prose answer (the "raw data" view) and carried
/// verbatim into exports.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuxiliaryData(pub Vec<AuxRecord>);

impl AuxiliaryData {
    /// Wrap a list of records
    #[must_use]
    pub fn new(records: Vec<AuxRecord>) -> Self {
        Self(records)
    }

    /// The records, in the order the service returned them
    #[must_use]
    pub fn records(&self) -> &[AuxRecord] {
        &self.0
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pretty-printed JSON, two-space indented
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Phase of the question/answer cycle
///
/// One tagged value instead of independent "thinking" / "streaming" flags, so
/// combinations like "thinking while streaming" cannot be represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// Ready for a new question
    #[default]
    Idle,
    /// Question sent, waiting on the answering service
    AwaitingResponse,
    /// Answer received and being revealed character by character
    Streaming,
    /// The query failed; reported, then immediately back to `Idle`
    Error,
}

impl TurnPhase {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::AwaitingResponse => "Thinking...",
            Self::Streaming => "Responding...",
            Self::Error => "Error",
        }
    }

    /// Whether a new submission would be accepted
    #[must_use]
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Updates from the controller to a rendering surface
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ChatUpdate {
    // ============================================
    // Conversation
    // ============================================
    /// Turn phase changed
    Phase {
        /// The new phase
        phase: TurnPhase,
    },

    /// A message was appended to the conversation
    MessageAppended {
        /// Message id
        id: MessageId,
        /// Who sent it
        role: MessageRole,
        /// Full content (renderers of a streaming message show the revealed prefix instead)
        content: String,
        /// Auxiliary data attached to an answer
        auxiliary_data: Option<AuxiliaryData>,
        /// Whether the content will be revealed incrementally
        streaming: bool,
    },

    /// The revealed prefix of the active stream grew
    Reveal {
        /// Message being revealed
        message_id: MessageId,
        /// Everything revealed so far
        revealed: String,
    },

    /// The active stream finished revealing
    StreamEnd {
        /// Message that completed
        message_id: MessageId,
    },

    /// Conversation was cleared
    Cleared,

    // ============================================
    // Uploads
    // ============================================
    /// An upload attempt started (progress reset to 0)
    UploadStarted {
        /// File being uploaded
        filename: String,
    },

    /// Simulated upload progress advanced
    UploadProgress {
        /// File being uploaded
        filename: String,
        /// Progress percentage (0-100)
        percent: u8,
    },

    /// The upload failed and can be retried
    UploadFailed {
        /// File that failed
        filename: String,
        /// Error description
        error: String,
    },

    /// The upload succeeded and the progress display has settled
    UploadComplete {
        /// File that was uploaded
        filename: String,
    },
}
