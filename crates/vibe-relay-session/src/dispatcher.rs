//! Single-flight dispatch of queued instructions to the worker.
//!
//! The dispatcher owns the instruction queue and a `processing` flag. A run
//! starts only when the flag flips from idle to running, drains everything
//! queued so far into one batch, and always flips the flag back, even if the
//! run future is dropped mid-way.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::Notify;
use tracing::Instrument;
use uuid::Uuid;
use vibe_relay_core::{
    Batch, DialogId, ExecutorError, Item, SessionClient, SessionError, StatusReport, Worker,
    filter::with_marker,
};
use vibe_relay_executor::SendQueue;

use crate::{InstructionSink, SessionGate};

/// Dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Worker(#[from] ExecutorError),
}

impl DispatchError {
    /// Contention failures are not reported to the chat; the session is
    /// busy and the report would most likely fail the same way.
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Session(e) if e.is_contention())
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Wait after the worker exits before reading the side channel.
    pub settle_delay: Duration,
    /// Fallback file the worker may write status lines to.
    pub send_queue: Option<SendQueue>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(6),
            send_queue: None,
        }
    }
}

/// Outcome of one dispatch cycle.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Number of instructions merged into the batch.
    pub items: usize,
    /// Worker exit code, or the failure that ended the cycle.
    pub result: Result<i32, DispatchError>,
}

/// Resets the processing flag when dropped.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Dispatcher<C, W> {
    gate: Arc<SessionGate<C>>,
    worker: W,
    dialog: DialogId,
    queue: Mutex<VecDeque<Item>>,
    processing: AtomicBool,
    notify: Notify,
    config: DispatcherConfig,
}

impl<C, W> Dispatcher<C, W>
where
    C: SessionClient + 'static,
    W: Worker,
{
    #[must_use]
    pub fn new(
        gate: Arc<SessionGate<C>>,
        worker: W,
        dialog: DialogId,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            gate,
            worker,
            dialog,
            queue: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
            notify: Notify::new(),
            config,
        }
    }

    #[must_use]
    pub const fn worker(&self) -> &W {
        &self.worker
    }

    /// Queue an instruction and wake the dispatch loop.
    pub fn enqueue(&self, item: Item) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self.notify.notify_one();
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run one cycle if idle and there is work.
    ///
    /// Returns `None` when a run is already in progress or the queue is empty.
    pub async fn try_dispatch(&self) -> Option<RunReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let _guard = ProcessingGuard(&self.processing);

        let batch = Batch::drain(&mut self.queue.lock().unwrap_or_else(PoisonError::into_inner))?;
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("dispatch", %run_id, dialog = %self.dialog);

        let result = async {
            tracing::info!(items = batch.len(), "Running: {}", batch.preview(80));
            let result = self.cycle(&batch).await;
            match &result {
                Ok(exit_code) => tracing::info!(exit_code, "Run finished"),
                Err(e) => {
                    tracing::error!("Run failed: {e}");
                    if !e.is_contention() {
                        self.report(StatusReport::Error(e.to_string())).await;
                    }
                }
            }
            result
        }
        .instrument(span)
        .await;

        Some(RunReport {
            run_id,
            items: batch.len(),
            result,
        })
    }

    async fn cycle(&self, batch: &Batch) -> Result<i32, DispatchError> {
        self.gate
            .send_text(&self.dialog, &StatusReport::Starting.to_string())
            .await?;

        if let Some(queue) = &self.config.send_queue {
            if let Err(e) = queue.clear().await {
                tracing::warn!("Failed to clear {}: {e}", queue.path().display());
            }
        }

        let exit_code = self.worker.run(&batch.render()).await?;

        // Give the worker's own session writes time to land.
        tokio::time::sleep(self.config.settle_delay).await;
        self.forward_side_channel().await;

        self.gate
            .send_text(
                &self.dialog,
                &StatusReport::from_exit_code(exit_code).to_string(),
            )
            .await?;
        Ok(exit_code)
    }

    /// Forward lines the worker queued while it could not post itself.
    /// A line that fails to send is logged and dropped.
    async fn forward_side_channel(&self) {
        let Some(queue) = &self.config.send_queue else {
            return;
        };
        let lines = match queue.drain().await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}", queue.path().display());
                return;
            }
        };
        for line in lines {
            if let Err(e) = self.gate.send_text(&self.dialog, &with_marker(&line)).await {
                tracing::warn!("Failed to forward queued message: {e}");
            }
        }
    }

    async fn report(&self, status: StatusReport) {
        if let Err(e) = self.gate.send_text(&self.dialog, &status.to_string()).await {
            tracing::warn!("Failed to report status: {e}");
        }
    }

    /// Dispatch loop: wait for a trigger, then run until the queue is empty.
    ///
    /// Items queued during a run are picked up immediately after it.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.notify.notified().await;
            while self.try_dispatch().await.is_some() {}
        }
    }
}

impl<C, W> InstructionSink for Dispatcher<C, W>
where
    C: SessionClient + 'static,
    W: Worker,
{
    fn is_busy(&self) -> bool {
        self.is_processing()
    }

    fn submit(&self, item: Item) {
        self.enqueue(item);
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::{path::PathBuf, sync::atomic::AtomicUsize};

    use async_trait::async_trait;

    use super::*;
    use crate::{MemorySession, RetryPolicy};

    const DIALOG: DialogId = DialogId::Numeric(42);

    #[derive(Default)]
    struct FakeWorker {
        instructions: Mutex<Vec<String>>,
        exit_code: i32,
        fail: bool,
        delay: Duration,
        side_channel: Option<(PathBuf, &'static str)>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    #[async_trait]
    impl Worker for FakeWorker {
        async fn run(&self, instruction: &str) -> Result<i32, ExecutorError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            self.instructions.lock().unwrap().push(instruction.to_string());
            tokio::time::sleep(self.delay).await;
            if let Some((path, contents)) = &self.side_channel {
                tokio::fs::write(path, contents).await?;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExecutorError::SpawnFailed("gemini".into()));
            }
            Ok(self.exit_code)
        }
    }

    fn dispatcher(
        worker: FakeWorker,
        config: DispatcherConfig,
    ) -> Arc<Dispatcher<MemorySession, FakeWorker>> {
        let gate = Arc::new(SessionGate::new(
            MemorySession::new(),
            RetryPolicy::new(1, Duration::ZERO),
        ));
        Arc::new(Dispatcher::new(gate, worker, DIALOG, config))
    }

    fn quick() -> DispatcherConfig {
        DispatcherConfig {
            settle_delay: Duration::ZERO,
            send_queue: None,
        }
    }

    fn transcript(d: &Dispatcher<MemorySession, FakeWorker>) -> Vec<String> {
        d.gate.client().transcript(&DIALOG)
    }

    #[tokio::test]
    async fn test_empty_queue_does_nothing() {
        let d = dispatcher(FakeWorker::default(), quick());
        assert!(d.try_dispatch().await.is_none());
        assert!(!d.is_processing());
        assert!(transcript(&d).is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_done() {
        let d = dispatcher(FakeWorker::default(), quick());
        for text in ["a", "b", "c"] {
            d.enqueue(Item::new(1, text));
        }

        let report = d.try_dispatch().await.unwrap();
        assert_eq!(report.items, 3);
        assert_eq!(report.result.unwrap(), 0);
        assert_eq!(
            *d.worker().instructions.lock().unwrap(),
            vec!["Combined 3 messages into one todo:\n\n1. a\n2. b\n3. c"]
        );
        assert_eq!(transcript(&d), vec!["[bot] Starting...", "[bot] Done ✓"]);
        assert!(!d.is_processing());
        assert_eq!(d.queued(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let worker = FakeWorker {
            exit_code: 3,
            ..FakeWorker::default()
        };
        let d = dispatcher(worker, quick());
        d.enqueue(Item::new(1, "a"));

        assert_eq!(d.try_dispatch().await.unwrap().result.unwrap(), 3);
        assert_eq!(
            transcript(&d),
            vec!["[bot] Starting...", "[bot] Error (exit 3)"]
        );
    }

    #[tokio::test]
    async fn test_worker_error_is_reported() {
        let worker = FakeWorker {
            fail: true,
            ..FakeWorker::default()
        };
        let d = dispatcher(worker, quick());
        d.enqueue(Item::new(1, "a"));

        let report = d.try_dispatch().await.unwrap();
        assert!(matches!(report.result, Err(DispatchError::Worker(_))));
        assert_eq!(
            transcript(&d),
            vec!["[bot] Starting...", "[bot] Error: Spawn failed: gemini"]
        );
        assert!(!d.is_processing());
    }

    #[tokio::test]
    async fn test_contention_is_not_reported() {
        let d = dispatcher(FakeWorker::default(), quick());
        d.gate
            .client()
            .fail_next(SessionError::contention("database is locked"));
        d.enqueue(Item::new(1, "a"));

        let report = d.try_dispatch().await.unwrap();
        assert!(report.result.unwrap_err().is_contention());
        assert!(transcript(&d).is_empty());
        assert!(d.worker().instructions.lock().unwrap().is_empty());
        assert!(!d.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_side_channel_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let queue_path = dir.path().join(".vibe-send-queue");
        tokio::fs::write(&queue_path, "stale\n").await.unwrap();
        let worker = FakeWorker {
            side_channel: Some((queue_path.clone(), "from worker\n\n[bot] tagged\n")),
            ..FakeWorker::default()
        };
        let d = dispatcher(
            worker,
            DispatcherConfig {
                send_queue: Some(SendQueue::new(&queue_path)),
                ..DispatcherConfig::default()
            },
        );
        d.enqueue(Item::new(1, "a"));

        let start = tokio::time::Instant::now();
        d.try_dispatch().await.unwrap().result.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(
            transcript(&d),
            vec![
                "[bot] Starting...",
                "[bot] from worker",
                "[bot] tagged",
                "[bot] Done ✓"
            ]
        );
        assert_eq!(tokio::fs::read_to_string(&queue_path).await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_queued_during_run_follow_immediately() {
        let worker = FakeWorker {
            delay: Duration::from_secs(1),
            ..FakeWorker::default()
        };
        let d = dispatcher(worker, quick());
        let handle = tokio::spawn(Arc::clone(&d).run());

        d.enqueue(Item::new(1, "a"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(d.is_processing());
        d.enqueue(Item::new(2, "b"));
        d.enqueue(Item::new(3, "c"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.abort();

        assert_eq!(
            *d.worker().instructions.lock().unwrap(),
            vec![
                "a".to_string(),
                "Combined 2 messages into one todo:\n\n1. b\n2. c".to_string()
            ]
        );
        assert_eq!(
            transcript(&d),
            vec![
                "[bot] Starting...",
                "[bot] Done ✓",
                "[bot] Starting...",
                "[bot] Done ✓"
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_are_single_flight() {
        let worker = FakeWorker {
            delay: Duration::from_millis(20),
            ..FakeWorker::default()
        };
        let d = dispatcher(worker, quick());

        let mut tasks = Vec::new();
        for i in 0..8 {
            d.enqueue(Item::new(i, format!("task {i}")));
            let d = Arc::clone(&d);
            tasks.push(tokio::spawn(async move { d.try_dispatch().await.is_some() }));
        }
        let mut runs = 0;
        for task in tasks {
            if task.await.unwrap() {
                runs += 1;
            }
        }
        while d.try_dispatch().await.is_some() {
            runs += 1;
        }

        assert_eq!(d.worker().max_running.load(Ordering::SeqCst), 1);
        let instructions = d.worker().instructions.lock().unwrap().len();
        assert_eq!(instructions, runs);
        assert_eq!(d.queued(), 0);
        assert_eq!(transcript(&d).len(), runs * 2);
    }
}
