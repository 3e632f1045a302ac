//! In-memory session client.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use vibe_relay_core::{DialogId, DialogInfo, Item, SessionClient, SessionError};

/// In-memory session client.
///
/// Useful for development and tests: messages live in process memory,
/// sends are appended to the dialog like any other message, and failures
/// can be scripted with [`MemorySession::fail_next`].
pub struct MemorySession {
    state: Mutex<State>,
    connected: AtomicBool,
}

struct Dialog {
    name: String,
    messages: Vec<Item>,
}

struct State {
    dialogs: BTreeMap<DialogKey, Dialog>,
    next_id: i64,
    authorized: bool,
    connect_faults: VecDeque<SessionError>,
    op_faults: VecDeque<SessionError>,
    connects: usize,
    holders: usize,
    max_holders: usize,
}

type DialogKey = String;

fn key(dialog: &DialogId) -> DialogKey {
    dialog.to_string()
}

impl MemorySession {
    /// Create an authorized session with no dialogs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                dialogs: BTreeMap::new(),
                next_id: 1,
                authorized: true,
                connect_faults: VecDeque::new(),
                op_faults: VecDeque::new(),
                connects: 0,
                holders: 0,
                max_holders: 0,
            }),
            connected: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, SessionError> {
        self.state.lock().map_err(|e| SessionError::other(e.to_string()))
    }

    /// Register a dialog with a display name.
    #[must_use]
    pub fn with_dialog(self, dialog: &DialogId, name: impl Into<String>) -> Self {
        if let Ok(mut state) = self.lock() {
            state.dialogs.entry(key(dialog)).or_insert_with(|| Dialog {
                name: name.into(),
                messages: Vec::new(),
            });
        }
        self
    }

    /// Append a message as if another participant posted it.
    ///
    /// # Errors
    /// Returns error if the internal lock is poisoned.
    pub fn post(&self, dialog: &DialogId, text: &str) -> Result<i64, SessionError> {
        let mut state = self.lock()?;
        Ok(state.append(dialog, text))
    }

    /// Every message text in a dialog, oldest first.
    #[must_use]
    pub fn transcript(&self, dialog: &DialogId) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|s| {
                s.dialogs
                    .get(&key(dialog))
                    .map(|d| d.messages.iter().map(|m| m.text.clone()).collect())
            })
            .unwrap_or_default()
    }

    /// Fail the next session operation (fetch, send, list, auth check).
    pub fn fail_next(&self, error: SessionError) {
        if let Ok(mut state) = self.lock() {
            state.op_faults.push_back(error);
        }
    }

    /// Fail the next `connect`.
    pub fn fail_next_connect(&self, error: SessionError) {
        if let Ok(mut state) = self.lock() {
            state.connect_faults.push_back(error);
        }
    }

    pub fn set_authorized(&self, authorized: bool) {
        if let Ok(mut state) = self.lock() {
            state.authorized = authorized;
        }
    }

    /// Number of successful connects so far.
    ///
    /// Connects while already connected count too.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.lock().map(|s| s.connects).unwrap_or_default()
    }

    /// Highest number of overlapping connect/disconnect sequences observed.
    #[must_use]
    pub fn max_concurrent_holders(&self) -> usize {
        self.lock().map(|s| s.max_holders).unwrap_or_default()
    }

    /// Common prologue for operations: must be connected, may be scripted to fail.
    async fn begin_op(&self) -> Result<(), SessionError> {
        // Yield so overlapping callers would actually interleave.
        tokio::task::yield_now().await;
        if !self.is_connected() {
            return Err(SessionError::connection("not connected"));
        }
        if let Some(fault) = self.lock()?.op_faults.pop_front() {
            return Err(fault);
        }
        Ok(())
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn append(&mut self, dialog: &DialogId, text: &str) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.dialogs
            .entry(key(dialog))
            .or_insert_with(|| Dialog {
                name: key(dialog),
                messages: Vec::new(),
            })
            .messages
            .push(Item::new(id, text));
        id
    }
}

#[async_trait]
impl SessionClient for MemorySession {
    async fn connect(&self) -> Result<(), SessionError> {
        tokio::task::yield_now().await;
        let mut state = self.lock()?;
        if let Some(fault) = state.connect_faults.pop_front() {
            return Err(fault);
        }
        self.connected.store(true, Ordering::SeqCst);
        state.connects += 1;
        state.holders += 1;
        state.max_holders = state.max_holders.max(state.holders);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let mut state = self.lock()?;
        self.connected.store(false, Ordering::SeqCst);
        state.holders = state.holders.saturating_sub(1);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, SessionError> {
        self.begin_op().await?;
        Ok(self.lock()?.authorized)
    }

    async fn fetch_recent(
        &self,
        dialog: &DialogId,
        limit: usize,
    ) -> Result<Vec<Item>, SessionError> {
        self.begin_op().await?;
        let state = self.lock()?;
        Ok(state
            .dialogs
            .get(&key(dialog))
            .map(|d| d.messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_text(&self, dialog: &DialogId, text: &str) -> Result<(), SessionError> {
        self.begin_op().await?;
        self.lock()?.append(dialog, text);
        Ok(())
    }

    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, SessionError> {
        self.begin_op().await?;
        let state = self.lock()?;
        Ok(state
            .dialogs
            .iter()
            .map(|(id, d)| DialogInfo {
                id: id.clone(),
                name: d.name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_is_newest_first_and_limited() {
        let dialog = DialogId::Numeric(-1);
        let session = MemorySession::new();
        for text in ["a", "b", "c"] {
            session.post(&dialog, text).unwrap();
        }
        session.connect().await.unwrap();
        let items = session.fetch_recent(&dialog, 2).await.unwrap();
        assert_eq!(items, vec![Item::new(3, "c"), Item::new(2, "b")]);
    }

    #[tokio::test]
    async fn test_operations_need_connection() {
        let session = MemorySession::new();
        let err = session
            .send_text(&DialogId::Numeric(1), "x")
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_scripted_faults_are_consumed_in_order() {
        let dialog = DialogId::Username("me".into());
        let session = MemorySession::new().with_dialog(&dialog, "Me");
        session.fail_next(SessionError::contention("database is locked"));
        session.connect().await.unwrap();

        assert!(session.list_dialogs().await.unwrap_err().is_contention());
        let dialogs = session.list_dialogs().await.unwrap();
        assert_eq!(
            dialogs,
            vec![DialogInfo {
                id: "me".into(),
                name: "Me".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_sends_appear_in_transcript() {
        let dialog = DialogId::Numeric(5);
        let session = MemorySession::new();
        session.connect().await.unwrap();
        session.send_text(&dialog, "[bot] hi").await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.transcript(&dialog), vec!["[bot] hi"]);
        assert_eq!(session.connect_count(), 1);
        assert!(!session.is_connected());
    }
}
