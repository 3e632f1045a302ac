//! Merging queued instructions into one worker prompt.

use std::collections::VecDeque;

use crate::Item;

/// Instructions drained from the queue for a single worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    items: Vec<Item>,
}

impl Batch {
    /// Drain every queued item, preserving arrival order.
    ///
    /// Returns `None` when the queue is empty.
    pub fn drain(queue: &mut VecDeque<Item>) -> Option<Self> {
        if queue.is_empty() {
            return None;
        }
        Some(Self {
            items: queue.drain(..).collect(),
        })
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Render the batch as one instruction.
    ///
    /// A single item is passed through verbatim; several items become a
    /// numbered list under a "Combined N messages" header.
    #[must_use]
    pub fn render(&self) -> String {
        if let [only] = self.items.as_slice() {
            return only.text.clone();
        }
        let list = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}", i + 1, item.text))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Combined {} messages into one todo:\n\n{list}", self.items.len())
    }

    /// Rendered text cut to `max_chars` for log lines.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let rendered = self.render();
        match rendered.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &rendered[..cut]),
            None => rendered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(texts: &[&str]) -> VecDeque<Item> {
        texts
            .iter()
            .zip(1..)
            .map(|(t, id)| Item::new(id, *t))
            .collect()
    }

    #[test]
    fn test_single_item_is_verbatim() {
        let mut queue = queue_of(&["a"]);
        let batch = Batch::drain(&mut queue).unwrap();
        assert_eq!(batch.render(), "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_multiple_items_are_numbered() {
        let mut queue = queue_of(&["a", "b", "c"]);
        let batch = Batch::drain(&mut queue).unwrap();
        assert_eq!(
            batch.render(),
            "Combined 3 messages into one todo:\n\n1. a\n2. b\n3. c"
        );
        assert_eq!(batch.len(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_empty_queue() {
        let mut queue = VecDeque::new();
        assert!(Batch::drain(&mut queue).is_none());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let mut queue = queue_of(&["ääääää"]);
        let batch = Batch::drain(&mut queue).unwrap();
        assert_eq!(batch.preview(3), "äää...");
        assert_eq!(batch.preview(80), "ääääää");
    }
}
