//! Network Client
//!
//! Wraps a [`Transport`] with the fallback policy: a request that never
//! reached a server is answered locally, anything a server rejected is
//! surfaced to the caller.

use std::fmt;

use thiserror::Error;

use super::fallback::FallbackResponder;
use super::traits::{
    classify, FailureClass, QueryRequest, QueryResponse, Transport, TransportError,
};
use crate::config::ChatConfig;
use crate::files::FileHandle;
use crate::messages::AuxiliaryData;

/// Which call failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// `POST /query`
    Query,
    /// `POST /upload`
    Upload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "Query"),
            Self::Upload => write!(f, "Upload"),
        }
    }
}

/// A failure the caller has to deal with
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// The service was reached but did not succeed
    #[error("{operation} failed: {message}")]
    Application {
        /// Failed call
        operation: Operation,
        /// HTTP status, when the server answered with one
        status: Option<u16>,
        /// Description
        message: String,
    },

    /// The service answered 2xx with a body that is not a valid answer
    #[error("{operation} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Failed call
        operation: Operation,
        /// Decode failure
        reason: String,
    },

    /// The service was unreachable and fallback is disabled
    #[error("{operation} failed: service unreachable ({reason})")]
    Connectivity {
        /// Failed call
        operation: Operation,
        /// Underlying cause
        reason: String,
    },
}

impl NetworkError {
    /// HTTP status, if a server answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Application { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this came from an unreachable service
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Which call failed
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Application { operation, .. }
            | Self::InvalidResponse { operation, .. }
            | Self::Connectivity { operation, .. } => *operation,
        }
    }
}

/// A successful answer, real or synthetic
#[derive(Clone, Debug, PartialEq)]
pub struct Answer {
    /// Prose answer
    pub answer: String,
    /// Structured records, if the service sent any
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl From<QueryResponse> for Answer {
    fn from(response: QueryResponse) -> Self {
        Self {
            answer: response.answer,
            auxiliary_data: response.data.map(AuxiliaryData::new),
        }
    }
}

/// Outcome of the fallback decision
#[derive(Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Answer locally
    Fallback,
    /// Report to the caller
    Surface(NetworkError),
}

/// Query/upload client with connectivity fallback
pub struct NetworkClient<T: Transport> {
    transport: T,
    fallback: FallbackResponder,
    fallback_enabled: bool,
}

impl<T: Transport> NetworkClient<T> {
    /// Create a client with the default fallback responder
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            fallback: FallbackResponder::default(),
            fallback_enabled: true,
        }
    }

    /// Create a client using the fallback settings from `ChatConfig`
    pub fn from_config(transport: T, config: &ChatConfig) -> Self {
        Self {
            transport,
            fallback: FallbackResponder::new(
                config.fallback_query_delay,
                config.fallback_upload_delay,
            ),
            fallback_enabled: config.fallback_enabled,
        }
    }

    /// Replace the fallback responder
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackResponder) -> Self {
        self.fallback = fallback;
        self
    }

    /// Enable or disable the offline fallback
    #[must_use]
    pub fn with_fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// The wrapped transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask a question
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] when the service rejected the request, sent
    /// an unusable answer, or was unreachable with fallback disabled.
    pub async fn query(&self, text: &str) -> Result<Answer, NetworkError> {
        let request = QueryRequest::new(text);
        match self.transport.query(&request).await {
            Ok(response) => Ok(response.into()),
            Err(error) => match self.recover(Operation::Query, error) {
                Recovery::Fallback => Ok(self.fallback.answer().await.into()),
                Recovery::Surface(error) => Err(error),
            },
        }
    }

    /// Upload a document
    ///
    /// # Errors
    ///
    /// Same policy as [`NetworkClient::query`].
    pub async fn upload(&self, file: &FileHandle) -> Result<(), NetworkError> {
        match self.transport.upload(file).await {
            Ok(()) => {
                tracing::info!(file = file.name(), "Upload accepted");
                Ok(())
            }
            Err(error) => match self.recover(Operation::Upload, error) {
                Recovery::Fallback => {
                    self.fallback.upload().await;
                    tracing::info!(file = file.name(), "Upload simulated");
                    Ok(())
                }
                Recovery::Surface(error) => Err(error),
            },
        }
    }

    /// Decide between local fallback and surfacing a transport failure
    pub fn recover(&self, operation: Operation, error: TransportError) -> Recovery {
        match (classify(&error), self.fallback_enabled) {
            (FailureClass::Connectivity, true) => {
                tracing::warn!(
                    transport = self.transport.name(),
                    %operation,
                    error = %error,
                    "Service unreachable, using offline fallback"
                );
                Recovery::Fallback
            }
            (FailureClass::Connectivity, false) => {
                tracing::warn!(%operation, error = %error, "Service unreachable");
                Recovery::Surface(NetworkError::Connectivity {
                    operation,
                    reason: error.to_string(),
                })
            }
            (FailureClass::Application, _) => {
                tracing::warn!(%operation, error = %error, "Service request failed");
                Recovery::Surface(surface(operation, error))
            }
        }
    }
}

fn surface(operation: Operation, error: TransportError) -> NetworkError {
    match error {
        TransportError::Status { status, body, .. } => {
            let message = if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", body.trim())
            };
            NetworkError::Application {
                operation,
                status: Some(status),
                message,
            }
        }
        TransportError::Decode { reason, .. } => {
            NetworkError::InvalidResponse { operation, reason }
        }
        TransportError::Io { reason, .. } => NetworkError::Application {
            operation,
            status: None,
            message: reason,
        },
        TransportError::Unreachable { reason, .. } => NetworkError::Connectivity { operation, reason },
    }
}
