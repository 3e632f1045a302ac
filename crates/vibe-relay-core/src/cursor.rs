//! Dedup and ordering state for polled messages.

use std::collections::HashSet;

use crate::{Item, filter::is_self_originated};

/// Result of feeding one fetch into the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First fetch: history up to `last_processed_id` is treated as already seen.
    Baseline { last_processed_id: i64 },
    /// New instructions in ascending id order, text trimmed.
    Admitted(Vec<Item>),
}

/// Tracks which source messages have already been handled.
///
/// `seen_ids` is never pruned and grows for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    last_processed_id: i64,
    seen_ids: HashSet<i64>,
    initialized: bool,
}

impl Cursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn last_processed_id(&self) -> i64 {
        self.last_processed_id
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn has_seen(&self, id: i64) -> bool {
        self.seen_ids.contains(&id)
    }

    /// Feed one fetch, in any order, and return what should be enqueued.
    pub fn observe(&mut self, mut fetched: Vec<Item>) -> Observation {
        fetched.sort_by_key(|item| item.id);

        if !self.initialized {
            self.last_processed_id = fetched.iter().map(|i| i.id).max().unwrap_or(0).max(0);
            self.initialized = true;
            return Observation::Baseline {
                last_processed_id: self.last_processed_id,
            };
        }

        let mut admitted = Vec::new();
        for item in fetched {
            if item.id <= self.last_processed_id || self.seen_ids.contains(&item.id) {
                continue;
            }
            let text = item.text.trim();
            if text.is_empty() {
                continue;
            }
            if is_self_originated(text) {
                tracing::trace!(id = item.id, "Skipping own message");
                continue;
            }
            self.seen_ids.insert(item.id);
            self.last_processed_id = self.last_processed_id.max(item.id);
            admitted.push(Item::new(item.id, text));
        }
        Observation::Admitted(admitted)
    }
}
