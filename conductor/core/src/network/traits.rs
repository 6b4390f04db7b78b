//! Transport Traits
//!
//! Trait definitions for the answering service transport, plus the error
//! classification that decides between fallback and surfacing a failure.
//!
//! # Design Philosophy
//!
//! A [`Transport`] only reports what happened on the wire. Whether a failure
//! is recovered locally is decided in exactly one place, [`classify`], so the
//! policy can be tested without any network at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::FileHandle;
use crate::messages::AuxRecord;

/// Body of `POST /query`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The user's question, exactly as typed
    pub query: String,
}

impl QueryRequest {
    /// Create a request for a question
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// Success body of `POST /query`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Prose answer
    pub answer: String,
    /// Optional structured records
    #[serde(default)]
    pub data: Option<Vec<AuxRecord>>,
}

/// What went wrong talking to the service
#[derive(Debug, Error)]
pub enum TransportError {
    /// No server could be reached (DNS, refused connection, offline)
    #[error("cannot reach {endpoint}: {reason}")]
    Unreachable {
        /// URL that was attempted
        endpoint: String,
        /// Underlying cause
        reason: String,
    },

    /// A server answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        /// URL that answered
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: String,
    },

    /// A success response could not be decoded
    #[error("invalid response from {endpoint}: {reason}")]
    Decode {
        /// URL that answered
        endpoint: String,
        /// Decode failure
        reason: String,
    },

    /// The exchange broke after a server was reached (timeout, reset, body read)
    #[error("request to {endpoint} failed: {reason}")]
    Io {
        /// URL that was attempted
        endpoint: String,
        /// Underlying cause
        reason: String,
    },
}

impl TransportError {
    /// HTTP status, if a server answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How a transport failure should be handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Nothing was reached; eligible for local fallback
    Connectivity,
    /// A server was involved; surface to the user
    Application,
}

/// Classify a transport failure
///
/// Only a request that never reached a server is a connectivity failure.
/// Timeouts and broken exchanges count as application failures, since a
/// server may have seen the request.
#[must_use]
pub fn classify(error: &TransportError) -> FailureClass {
    match error {
        TransportError::Unreachable { .. } => FailureClass::Connectivity,
        TransportError::Status { .. }
        | TransportError::Decode { .. }
        | TransportError::Io { .. } => FailureClass::Application,
    }
}

/// Wire access to the answering service
///
/// Implementations must be `Send + Sync` so calls can run on spawned tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &'static str;

    /// Ask a question about the uploaded document
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError>;

    /// Send a document as multipart field `file`
    async fn upload(&self, file: &FileHandle) -> Result<(), TransportError>;
}
