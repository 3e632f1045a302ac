//! Polling the dialog for new instructions.

use std::{sync::Arc, time::Duration};

use tokio::time::MissedTickBehavior;
use vibe_relay_core::{
    Cursor, DialogId, Item, Observation, SessionClient, SessionError, SessionErrorKind,
};

use crate::SessionGate;

/// Where admitted instructions go.
pub trait InstructionSink: Send + Sync {
    /// Whether a worker run is in progress. Polling pauses while it is.
    fn is_busy(&self) -> bool;

    /// Hand over one instruction.
    fn submit(&self, item: Item);
}

/// Result of one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The sink was busy; nothing was fetched.
    Skipped,
    /// First successful fetch; history before this point is ignored.
    Baseline { last_processed_id: i64 },
    /// Number of new instructions handed to the sink.
    Enqueued(usize),
}

/// Fetches recent messages and admits each new instruction exactly once.
pub struct Poller<C> {
    gate: Arc<SessionGate<C>>,
    sink: Arc<dyn InstructionSink>,
    dialog: DialogId,
    window: usize,
    interval: Duration,
    cursor: Cursor,
}

impl<C> Poller<C>
where
    C: SessionClient + 'static,
{
    #[must_use]
    pub fn new(
        gate: Arc<SessionGate<C>>,
        sink: Arc<dyn InstructionSink>,
        dialog: DialogId,
        interval: Duration,
    ) -> Self {
        Self {
            gate,
            sink,
            dialog,
            window: 20,
            interval,
            cursor: Cursor::new(),
        }
    }

    /// Number of recent messages fetched per tick.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    #[must_use]
    pub const fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Poll once.
    ///
    /// # Errors
    /// Returns the session error if the fetch failed; the cursor is untouched.
    pub async fn tick(&mut self) -> Result<PollOutcome, SessionError> {
        if self.sink.is_busy() {
            return Ok(PollOutcome::Skipped);
        }

        let fetched = self.gate.fetch_recent(&self.dialog, self.window).await?;
        match self.cursor.observe(fetched) {
            Observation::Baseline { last_processed_id } => {
                tracing::info!(dialog = %self.dialog, last_processed_id, "Polling from baseline");
                Ok(PollOutcome::Baseline { last_processed_id })
            }
            Observation::Admitted(items) => {
                let count = items.len();
                for item in items {
                    tracing::info!(dialog = %self.dialog, id = item.id, "New instruction");
                    self.sink.submit(item);
                }
                Ok(PollOutcome::Enqueued(count))
            }
        }
    }

    /// Poll forever at the configured interval. The first tick is immediate.
    ///
    /// Fetch failures are logged and retried on the next tick. Cancel by
    /// dropping the future.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(_) => {}
                Err(e) if e.kind == SessionErrorKind::Unauthorized => {
                    tracing::error!(dialog = %self.dialog, "Poll failed: {e}");
                }
                Err(e) => tracing::warn!(dialog = %self.dialog, "Poll failed: {e}"),
            }
        }
    }
}
