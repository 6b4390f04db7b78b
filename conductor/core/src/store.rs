//! Message Store
//!
//! Ordered, append-only log of conversation turns plus the pointer to the
//! message currently being revealed.
//!
//! # Invariants
//!
//! - Insertion order is display order; messages are never reordered.
//! - Message ids are unique within the store.
//! - At most one message is the active stream target, and it is always an
//!   assistant message.
//!
//! All mutation goes through `&mut self`, so a reader holding `&self` can
//! never observe a half-appended message.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{AuxiliaryData, MessageId, MessageRole};

/// Errors raised by the message store
///
/// These signal a broken id-generation or controller invariant; they are not
/// expected during normal operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A message with this id is already in the log
    #[error("duplicate message id: {0}")]
    DuplicateId(MessageId),

    /// Only assistant messages may be streamed
    #[error("message {0} is not an assistant message")]
    NotAssistant(MessageId),

    /// No message with this id exists
    #[error("unknown message id: {0}")]
    UnknownMessage(MessageId),
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content (immutable once created)
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Structured data that came with an answer
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl Message {
    /// Create a message with a fresh id
    pub fn new(
        role: MessageRole,
        content: impl Into<String>,
        auxiliary_data: Option<AuxiliaryData>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            auxiliary_data,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, None)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>, auxiliary_data: Option<AuxiliaryData>) -> Self {
        Self::new(MessageRole::Assistant, content, auxiliary_data)
    }
}

/// Read-only snapshot of the conversation for renderers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Messages in display order
    pub messages: Vec<Message>,
    /// Assistant message currently being revealed, if any
    pub active_stream_message_id: Option<MessageId>,
}

/// Append-only conversation log
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    active_stream: Option<MessageId>,
}

impl MessageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the log
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if the id is already present; the
    /// log is left unchanged.
    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        if self.ids.contains(&message.id) {
            return Err(StoreError::DuplicateId(message.id));
        }
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        Ok(())
    }

    /// All messages in display order
    #[must_use]
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    /// Owned snapshot of messages and the active stream pointer
    #[must_use]
    pub fn snapshot(&self) -> ConversationState {
        ConversationState {
            messages: self.messages.clone(),
            active_stream_message_id: self.active_stream.clone(),
        }
    }

    /// Get message by ID
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter().rev().find(|m| &m.id == id)
    }

    /// The most recent assistant message
    #[must_use]
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    /// Mark an assistant message as the active stream target
    ///
    /// Replaces any previous target.
    ///
    /// # Errors
    ///
    /// Fails if the message is unknown or is not an assistant message.
    pub fn set_active_stream(&mut self, id: &MessageId) -> Result<(), StoreError> {
        let message = self
            .get(id)
            .ok_or_else(|| StoreError::UnknownMessage(id.clone()))?;
        if message.role != MessageRole::Assistant {
            return Err(StoreError::NotAssistant(id.clone()));
        }
        self.active_stream = Some(id.clone());
        Ok(())
    }

    /// Clear the active stream target, returning the previous one
    pub fn clear_active_stream(&mut self) -> Option<MessageId> {
        self.active_stream.take()
    }

    /// The active stream target
    #[must_use]
    pub fn active_stream(&self) -> Option<&MessageId> {
        self.active_stream.as_ref()
    }

    /// Whether the given message is the active stream target
    #[must_use]
    pub fn is_streaming(&self, id: &MessageId) -> bool {
        self.active_stream.as_ref() == Some(id)
    }

    /// Empty the log and drop the stream association
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.active_stream = None;
    }

    /// Get current message count
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
