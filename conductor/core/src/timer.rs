//! Scheduled Tasks
//!
//! Cancellable handles for the background timers that drive reveals, upload
//! progress, and settle delays.
//!
//! # Design Philosophy
//!
//! Background tasks never touch conversation state. They only send events
//! tagged with the [`Generation`] that was current when they were spawned.
//! The owner bumps its generation on every cancel or restart and drops any
//! event whose tag no longer matches, so a timer that was already in flight
//! when it was cancelled can never mutate state late.

use std::future::Future;

use tokio::task::JoinHandle;

/// Monotonic tag identifying one run of a timer-driven activity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Advance to the next generation, returning it
    pub fn next(&mut self) -> Self {
        self.0 = self.0.wrapping_add(1);
        *self
    }

    /// Raw counter value (for logging)
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A spawned background task that is aborted on cancel or drop
#[derive(Debug)]
pub struct ScheduledTask {
    label: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn a task onto the current tokio runtime
    pub fn spawn<F>(label: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = label, "Scheduling task");
        Self {
            label,
            handle: Some(tokio::spawn(future)),
        }
    }

    /// A handle with nothing scheduled
    #[must_use]
    pub fn idle(label: &'static str) -> Self {
        Self {
            label,
            handle: None,
        }
    }

    /// Abort the task; calling this more than once is a no-op
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                tracing::trace!(task = self.label, "Cancelling task");
            }
            handle.abort();
        }
    }

    /// Whether the task has been scheduled and has not yet finished
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
