//! Network
//!
//! Access to the remote answering service.
//!
//! # Architecture
//!
//! ```text
//! NetworkClient ──> Transport (trait) ──> HttpTransport (reqwest)
//!       │
//!       └── on connectivity failure ──> FallbackResponder
//! ```
//!
//! The client is the only component that decides whether a failure is
//! recovered locally; see [`classify`] and [`NetworkClient::recover`].

pub mod client;
pub mod fallback;
pub mod http;
pub mod traits;

pub use client::{Answer, NetworkClient, NetworkError, Operation, Recovery};
pub use fallback::{fallback_records, FallbackResponder, FALLBACK_ANSWERS};
pub use http::HttpTransport;
pub use traits::{
    classify, FailureClass, QueryRequest, QueryResponse, Transport, TransportError,
};
