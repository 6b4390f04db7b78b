//! Docchat Core - Headless Document Q&A Conversation Engine
//!
//! This crate provides the conversation engine behind docchat, completely
//! independent of any UI framework. It can drive a terminal front end, a web
//! view, or run headless for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                               │
//! │   ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐  │
//! │   │  docchat CLI │   │   Web view   │   │   Test harness      │  │
//! │   └──────┬───────┘   └──────┬───────┘   └──────────┬──────────┘  │
//! │          └──────────────────┴──────────────────────┘             │
//! │                 submit / clear / upload (down)                   │
//! │                     ChatUpdate (up)                              │
//! └──────────────────────────────┼───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                        DOCCHAT CORE                              │
//! │  ┌───────────────────────────┴────────────────────────────────┐  │
//! │  │                     TurnController                         │  │
//! │  │  ┌────────────┐  ┌─────────────┐  ┌────────────────────┐   │  │
//! │  │  │  Message   │  │ Typewriter  │  │   UploadTracker    │   │  │
//! │  │  │   Store    │  │  Scheduler  │  │                    │   │  │
//! │  │  └────────────┘  └─────────────┘  └─────────┬──────────┘   │  │
//! │  │                 NetworkClient <─────────────┘              │  │
//! │  │          (HTTP transport + offline fallback)               │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use docchat_core::{load_config, ChatUpdate, HttpTransport, TurnController};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config().await?;
//!     let transport = HttpTransport::from_config(&config)?;
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let mut controller = TurnController::new(transport, config, tx);
//!
//!     controller.submit("What are the main topics?")?;
//!     while controller.step().await {
//!         while let Ok(update) = rx.try_recv() {
//!             // Render update
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`controller`]: Turn state machine and orchestration
//! - [`store`]: Append-only conversation log
//! - [`typewriter`]: Character-by-character answer reveal
//! - [`upload`]: Upload progress simulation and retry
//! - [`network`]: Service transport, fallback, and error classification
//! - [`messages`]: Shared identifiers and updates sent to surfaces
//! - [`files`]: Selected documents
//! - [`timer`]: Cancellable background tasks
//! - [`config`]: TOML/env/CLI configuration
//! - [`export`]: Markdown and printable HTML export of a conversation
//!
//! # No UI Dependencies
//!
//! This crate has **zero** terminal or UI framework dependencies.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod export;
pub mod files;
pub mod messages;
pub mod network;
pub mod store;
pub mod timer;
pub mod typewriter;
pub mod upload;

// Re-exports for convenience
pub use controller::{SubmitError, TurnController, QUERY_ERROR_MESSAGE};
pub use files::{FileHandle, ACCEPTED_EXTENSIONS};
pub use messages::{AuxRecord, AuxiliaryData, ChatUpdate, MessageId, MessageRole, TurnPhase};
pub use network::{
    classify, Answer, FailureClass, FallbackResponder, HttpTransport, NetworkClient, NetworkError,
    Operation, QueryRequest, QueryResponse, Transport, TransportError,
};
pub use store::{ConversationState, Message, MessageStore, StoreError};
pub use timer::{Generation, ScheduledTask};
pub use typewriter::{RevealFrame, StreamHandle, TypewriterScheduler, DEFAULT_REVEAL_INTERVAL};
pub use upload::{
    UploadError, UploadNotice, UploadPhase, UploadSettings, UploadState, UploadTracker,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ChatConfig,
    ChatToml, ConfigError, ConfigOverrides, ConfigSource,
};
