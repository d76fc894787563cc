//! Per-source scheduling: one tokio task per source, each with its own
//! fixed-interval ticker.
//!
//! - A task runs its cycle inline, so a tick that fires while the previous
//!   cycle is still running is dropped, never queued. Cycles of one source
//!   never overlap.
//! - Tasks share nothing but the cursor store and the status board. A slow or
//!   failing source cannot delay another source's ticks.
//! - No task ticks before the ready signal is raised.
//! - On shutdown the running cycle finishes its current delivery and saves
//!   confirmed progress; tasks still running after the grace period are
//!   aborted, which never saves anything.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use feedwatch_core::{BackoffTracker, ItemKey, SourceDescriptor, display_cursor};
use feedwatch_store::CursorStore;

use crate::adapter::SourceAdapter;
use crate::board::StatusBoard;
use crate::cycle::run_cycle;
use crate::sink::NotificationSink;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Everything one source task needs.
pub struct SourceTask {
    pub descriptor: SourceDescriptor,
    pub adapter: Arc<dyn SourceAdapter>,
    pub sink: Arc<dyn NotificationSink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that stopped within the grace period (or had already stopped).
    pub finished: usize,
    /// Source ids whose task was aborted.
    pub aborted: Vec<String>,
}

pub struct Scheduler {
    store: Arc<dyn CursorStore>,
    board: StatusBoard,
    ready: watch::Receiver<bool>,
    shutdown: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CursorStore>,
        board: StatusBoard,
        ready: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            board,
            ready,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Register the source on the board and start its task.
    pub fn spawn(&mut self, task: SourceTask) {
        self.board.register(&task.descriptor);
        let id = task.descriptor.id.clone();
        let worker = SourceWorker {
            task,
            store: Arc::clone(&self.store),
            board: self.board.clone(),
            shutdown: self.shutdown.clone(),
        };
        let ready = self.ready.clone();
        let handle = tokio::spawn(worker.run(ready));
        self.tasks.push((id, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every task to stop, wait up to `grace` for them, abort the rest.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.shutdown.cancel();
        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();

        for (id, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.finished += 1,
                Ok(Err(e)) => {
                    tracing::error!(source = %id, "source task failed: {e}");
                    report.finished += 1;
                }
                Err(_) => {
                    tracing::warn!(source = %id, "source task did not stop within grace period, aborting");
                    handle.abort();
                    report.aborted.push(id);
                }
            }
        }
        report
    }
}

// ─── Source Task ─────────────────────────────────────────────────────

struct SourceWorker {
    task: SourceTask,
    store: Arc<dyn CursorStore>,
    board: StatusBoard,
    shutdown: CancellationToken,
}

impl SourceWorker {
    async fn run(self, mut ready: watch::Receiver<bool>) {
        let id = self.task.descriptor.id.clone();

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return,
            res = ready.wait_for(|r| *r) => {
                if res.is_err() {
                    tracing::warn!(source = %id, "ready signal dropped before it was raised");
                    return;
                }
            }
        }

        let descriptor = &self.task.descriptor;
        let mut ticker = tokio::time::interval(descriptor.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backoff = BackoffTracker::new(descriptor.interval, descriptor.backoff);
        let mut last_cursor: Option<ItemKey> = None;

        tracing::info!(
            source = %id,
            provider = %descriptor.provider,
            interval_secs = descriptor.interval.as_secs(),
            "source started"
        );

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !backoff.should_run() {
                self.board.update(&id, |s| s.note_suppressed_tick());
                tracing::debug!(source = %id, remaining = backoff.ticks_to_skip(), "tick suppressed by backoff");
                continue;
            }
            if self.board.update(&id, |s| s.begin_cycle(Utc::now())) != Some(true) {
                break;
            }

            let result = run_cycle(
                descriptor,
                self.task.adapter.as_ref(),
                self.task.sink.as_ref(),
                &self.store,
                &self.shutdown,
            )
            .await;

            match result {
                Ok(report) => {
                    backoff.record_success();
                    if report.cursor_after.is_some() {
                        last_cursor = report.cursor_after.clone();
                    }
                    self.board.update(&id, |s| {
                        s.finish_success(report.summary(), report.cursor_after, report.delivered)
                    });
                }
                Err(err) if err.is_permanent() => {
                    let reason = err.to_string();
                    tracing::error!(
                        source = %id,
                        cursor = %display_cursor(err.confirmed_cursor().or(last_cursor.as_ref())),
                        status = err.status(),
                        "disabling source: {reason}"
                    );
                    self.board.update(&id, |s| {
                        s.finish_failure(
                            err.kind(),
                            reason.clone(),
                            err.confirmed_cursor().cloned(),
                            err.delivered(),
                            backoff.consecutive_failures() + 1,
                        );
                        s.disable(reason);
                    });
                    break;
                }
                Err(err) => {
                    let skipped = backoff.record_failure(err.retry_after());
                    if let Some(cursor) = err.confirmed_cursor() {
                        last_cursor = Some(cursor.clone());
                    }
                    tracing::warn!(
                        source = %id,
                        cursor = %display_cursor(last_cursor.as_ref()),
                        status = err.status(),
                        kind = err.kind().as_str(),
                        failures = backoff.consecutive_failures(),
                        skip_ticks = skipped,
                        "cycle failed: {err}"
                    );
                    self.board.update(&id, |s| {
                        s.finish_failure(
                            err.kind(),
                            err.to_string(),
                            err.confirmed_cursor().cloned(),
                            err.delivered(),
                            backoff.consecutive_failures(),
                        )
                    });
                }
            }
        }

        tracing::info!(source = %id, "source stopped");
    }
}
