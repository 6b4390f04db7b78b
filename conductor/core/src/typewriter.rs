//! Typewriter Scheduler
//!
//! Reveals an answer one character per tick so it reads like live generation.
//!
//! # Frame Guarantees
//!
//! For a target of `L` characters the ticker emits exactly `L + 1` progress
//! frames (revealed lengths `0..=L`), one per interval, then closes. The
//! scheduler turns the close into a single [`RevealFrame::Done`].
//!
//! - Revealed length only grows for a given [`StreamHandle`].
//! - `start` always resets: the previous reveal is cancelled and none of its
//!   frames are delivered afterwards.
//! - A poller that falls behind may coalesce frames with
//!   [`TypewriterScheduler::try_next_frame`], but always converges to the
//!   full text before `Done`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::timer::{Generation, ScheduledTask};

/// Default delay between revealed characters
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(30);

/// Identifies one reveal run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle(Generation);

/// Frame delivered to the scheduler's owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealFrame {
    /// The revealed prefix now spans `revealed_chars` characters
    Progress {
        /// Reveal this frame belongs to
        handle: StreamHandle,
        /// Number of characters revealed
        revealed_chars: usize,
    },
    /// The full text has been revealed
    Done {
        /// Reveal that finished
        handle: StreamHandle,
    },
}

impl RevealFrame {
    /// Reveal this frame belongs to
    #[must_use]
    pub fn handle(&self) -> StreamHandle {
        match self {
            Self::Progress { handle, .. } | Self::Done { handle } => *handle,
        }
    }
}

#[derive(Debug)]
struct Tick {
    generation: Generation,
    revealed_chars: usize,
}

#[derive(Debug)]
struct ActiveReveal {
    handle: StreamHandle,
    target: String,
    total_chars: usize,
    revealed_chars: usize,
    rx: mpsc::UnboundedReceiver<Tick>,
    task: ScheduledTask,
}

impl ActiveReveal {
    fn accept(&mut self, tick: &Tick) -> bool {
        if tick.generation != self.handle.0 {
            tracing::trace!(
                stale = tick.generation.value(),
                current = self.handle.0.value(),
                "Dropping stale reveal tick"
            );
            return false;
        }
        self.revealed_chars = self.revealed_chars.max(tick.revealed_chars);
        true
    }

    fn progress(&self) -> RevealFrame {
        RevealFrame::Progress {
            handle: self.handle,
            revealed_chars: self.revealed_chars,
        }
    }
}

/// Reveals one string at a time, one character per interval
#[derive(Debug)]
pub struct TypewriterScheduler {
    interval: Duration,
    generation: Generation,
    active: Option<ActiveReveal>,
}

impl Default for TypewriterScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INTERVAL)
    }
}

impl TypewriterScheduler {
    /// Create a scheduler with the given per-character interval
    ///
    /// A zero interval is raised to one millisecond.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            generation: Generation::default(),
            active: None,
        }
    }

    /// Per-character interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start revealing `text`, cancelling any reveal already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, text: impl Into<String>) -> StreamHandle {
        self.cancel_all();

        let target = text.into();
        let total_chars = target.chars().count();
        let generation = self.generation.next();
        let handle = StreamHandle(generation);
        let (tx, rx) = mpsc::unbounded_channel();
        let interval = self.interval;

        let task = ScheduledTask::spawn("typewriter", async move {
            let mut ticker = tokio::time::interval(interval);
            for revealed_chars in 0..=total_chars {
                ticker.tick().await;
                if tx
                    .send(Tick {
                        generation,
                        revealed_chars,
                    })
                    .is_err()
                {
                    return;
                }
            }
        });

        tracing::debug!(
            generation = generation.value(),
            chars = total_chars,
            "Typewriter started"
        );

        self.active = Some(ActiveReveal {
            handle,
            target,
            total_chars,
            revealed_chars: 0,
            rx,
            task,
        });
        handle
    }

    /// Stop a reveal; returns whether it was still running
    ///
    /// Idempotent. A handle that is no longer current is ignored.
    pub fn cancel(&mut self, handle: StreamHandle) -> bool {
        if self.active_handle() != Some(handle) {
            return false;
        }
        self.cancel_all();
        true
    }

    /// Stop whatever is running
    pub fn cancel_all(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.task.cancel();
            self.generation.next();
            tracing::debug!(
                revealed = active.revealed_chars,
                total = active.total_chars,
                "Typewriter cancelled"
            );
        }
    }

    /// Handle of the running reveal
    #[must_use]
    pub fn active_handle(&self) -> Option<StreamHandle> {
        self.active.as_ref().map(|a| a.handle)
    }

    /// Whether a reveal is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Text revealed so far by the running reveal
    #[must_use]
    pub fn revealed(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|a| char_prefix(&a.target, a.revealed_chars))
    }

    /// Wait for the next frame
    ///
    /// Returns `None` when nothing is running. Cancel safe, so it can sit in
    /// a `tokio::select!` arm.
    pub async fn next_frame(&mut self) -> Option<RevealFrame> {
        loop {
            let active = self.active.as_mut()?;
            match active.rx.recv().await {
                Some(tick) => {
                    if active.accept(&tick) {
                        return Some(active.progress());
                    }
                }
                None => return self.finish(),
            }
        }
    }

    /// Take whatever is ready without waiting, coalescing queued frames
    pub fn try_next_frame(&mut self) -> Option<RevealFrame> {
        let active = self.active.as_mut()?;
        let mut advanced = false;
        loop {
            match active.rx.try_recv() {
                Ok(tick) => advanced |= active.accept(&tick),
                Err(TryRecvError::Empty) => {
                    return advanced.then(|| active.progress());
                }
                Err(TryRecvError::Disconnected) => {
                    if advanced {
                        return Some(active.progress());
                    }
                    return self.finish();
                }
            }
        }
    }

    fn finish(&mut self) -> Option<RevealFrame> {
        let active = self.active.take()?;
        tracing::debug!(chars = active.total_chars, "Typewriter finished");
        Some(RevealFrame::Done {
            handle: active.handle,
        })
    }
}

/// The first `chars` characters of `text`
#[must_use]
pub fn char_prefix(text: &str, chars: usize) -> &str {
    let end = text
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(index, _)| index);
    &text[..end]
}
