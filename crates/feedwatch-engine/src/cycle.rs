//! One polling cycle for one source: load → fetch → plan → deliver → persist.
//!
//! Guarantees, for every cycle:
//! - the stored cursor only moves forward;
//! - it is saved once, at the key of the last item the sink acknowledged;
//! - a failed save leaves the stored cursor where it was, so the next cycle
//!   redelivers from there rather than skipping anything.
//!
//! Store calls may fsync, so they run on the blocking pool.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use feedwatch_core::{
    CursorError, CyclePlan, DeliveryError, DeliveryProgress, ErrorKind, ItemKey, SourceDescriptor,
    SourceError, display_cursor, plan_cycle,
};
use feedwatch_store::{CursorStore, StoreError};

use crate::adapter::SourceAdapter;
use crate::sink::NotificationSink;

// ─── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First cycle: cursor recorded, nothing delivered.
    Baseline,
    /// First cycle with an empty feed: cursor still unset.
    AwaitingBaseline,
    NoNewItems,
    Delivered,
    /// Shutdown was requested between items; confirmed progress was saved.
    Interrupted,
}

impl CycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::AwaitingBaseline => "awaiting_baseline",
            Self::NoNewItems => "no_new_items",
            Self::Delivered => "delivered",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Result of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub cursor_before: Option<ItemKey>,
    /// Stored cursor after the cycle (equal to `cursor_before` if nothing moved).
    pub cursor_after: Option<ItemKey>,
    pub delivered: usize,
    pub skipped_malformed: usize,
    /// Items the sink refused for good; the cursor moved past them.
    pub rejected: usize,
    pub duplicates: usize,
    pub deferred: usize,
}

impl CycleReport {
    /// Short human summary for the status board.
    pub fn summary(&self) -> String {
        match self.outcome {
            CycleOutcome::Delivered | CycleOutcome::Interrupted => {
                let mut s = format!("{} {}", self.outcome.as_str(), self.delivered);
                if self.deferred > 0 {
                    s.push_str(&format!(", {} deferred", self.deferred));
                }
                if self.skipped_malformed > 0 {
                    s.push_str(&format!(", {} malformed", self.skipped_malformed));
                }
                if self.rejected > 0 {
                    s.push_str(&format!(", {} rejected", self.rejected));
                }
                s
            }
            other => other.as_str().to_string(),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("cursor load failed: {0}")]
    Load(#[source] StoreError),

    #[error("fetch failed at cursor {cursor}: {source}")]
    Fetch {
        cursor: String,
        #[source]
        source: SourceError,
    },

    /// Save failed; the `delivered` items will be delivered again next cycle.
    #[error("cursor save failed at {attempted} after {delivered} deliveries: {source}")]
    Persist {
        attempted: ItemKey,
        delivered: usize,
        #[source]
        source: StoreError,
    },

    /// The sink failed; progress up to `cursor` was saved.
    #[error("delivery failed after {delivered} items (cursor {}): {source}", display_cursor(.cursor.as_ref()))]
    Delivery {
        delivered: usize,
        cursor: Option<ItemKey>,
        #[source]
        source: DeliveryError,
    },

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) | Self::Persist { .. } => ErrorKind::PersistenceFailure,
            Self::Fetch { source, .. } => source.kind(),
            Self::Delivery { source, .. } => source.kind(),
            Self::Cursor(_) => ErrorKind::Transient,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind() == ErrorKind::Permanent
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::Fetch { source, .. } => source.retry_after(),
            Self::Delivery { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { source, .. } => source.status(),
            Self::Delivery { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Items acknowledged by the sink and durably recorded before the failure.
    pub fn delivered(&self) -> usize {
        match self {
            Self::Delivery { delivered, .. } => *delivered,
            _ => 0,
        }
    }

    /// Cursor saved before the failure, if the cycle moved it.
    pub fn confirmed_cursor(&self) -> Option<&ItemKey> {
        match self {
            Self::Delivery { cursor, .. } => cursor.as_ref(),
            _ => None,
        }
    }
}

// ─── Runner ──────────────────────────────────────────────────────────

/// Run one cycle. `cancel` is checked before each delivery; once it fires the
/// cycle stops handing items to the sink and saves what was confirmed.
pub async fn run_cycle(
    descriptor: &SourceDescriptor,
    adapter: &dyn SourceAdapter,
    sink: &dyn NotificationSink,
    store: &Arc<dyn CursorStore>,
    cancel: &CancellationToken,
) -> Result<CycleReport, CycleError> {
    let key = descriptor.cursor_key();
    let source = descriptor.id.as_str();

    let cursor = load(store, &key).await.map_err(CycleError::Load)?;
    let shown = display_cursor(cursor.as_ref());
    tracing::debug!(source, cursor = %shown, "cycle start");

    let entries = adapter
        .fetch_since(cursor.as_ref(), descriptor.batch_limit)
        .await
        .map_err(|source| CycleError::Fetch {
            cursor: shown.clone(),
            source,
        })?;

    let plan = plan_cycle(
        cursor.as_ref(),
        entries,
        descriptor.batch_limit,
        descriptor.baseline,
    );
    for bad in plan.skipped() {
        tracing::warn!(
            source,
            cursor = %shown,
            raw_id = bad.raw_id.as_deref().unwrap_or("-"),
            reason = %bad.reason,
            "skipping malformed item"
        );
    }
    let skipped_malformed = plan.skipped().len();

    let mut report = CycleReport {
        outcome: CycleOutcome::NoNewItems,
        cursor_before: cursor.clone(),
        cursor_after: cursor.clone(),
        delivered: 0,
        skipped_malformed,
        rejected: 0,
        duplicates: 0,
        deferred: 0,
    };
    let mut progress = DeliveryProgress::new(cursor);

    let items = match plan {
        CyclePlan::AwaitBaseline { .. } => {
            report.outcome = CycleOutcome::AwaitingBaseline;
            return Ok(report);
        }
        CyclePlan::Baseline { cursor: newest, .. } => {
            progress.baseline(newest)?;
            persist(store, &key, &progress).await?;
            report.outcome = CycleOutcome::Baseline;
            report.cursor_after = progress.pending_save().cloned();
            tracing::info!(
                source,
                cursor = %display_cursor(report.cursor_after.as_ref()),
                "baseline recorded"
            );
            return Ok(report);
        }
        CyclePlan::Deliver {
            items,
            duplicates,
            deferred,
            ..
        } => {
            report.duplicates = duplicates;
            report.deferred = deferred;
            items
        }
    };

    if items.is_empty() {
        return Ok(report);
    }

    let mut failure = None;
    let mut interrupted = false;
    for item in items {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }
        match sink.deliver(&item).await {
            Ok(()) => progress.confirm(item.key)?,
            Err(e @ DeliveryError::Rejected { .. }) => {
                tracing::warn!(
                    source,
                    item = %item.key,
                    status = e.status(),
                    error = %e,
                    "sink rejected item, skipping"
                );
                progress.skip(item.key)?;
                report.rejected += 1;
            }
            Err(e) => {
                tracing::warn!(
                    source,
                    cursor = %display_cursor(progress.position()),
                    item = %item.key,
                    status = e.status(),
                    error = %e,
                    "delivery failed"
                );
                failure = Some(e);
                break;
            }
        }
    }

    persist(store, &key, &progress).await?;
    let saved = progress.pending_save().cloned().or(report.cursor_before.clone());

    if let Some(source) = failure {
        return Err(CycleError::Delivery {
            delivered: progress.delivered(),
            cursor: saved,
            source,
        });
    }

    report.delivered = progress.delivered();
    report.cursor_after = saved;
    report.outcome = if interrupted {
        CycleOutcome::Interrupted
    } else {
        CycleOutcome::Delivered
    };
    tracing::info!(
        source,
        delivered = report.delivered,
        cursor = %display_cursor(report.cursor_after.as_ref()),
        deferred = report.deferred,
        "cycle delivered"
    );
    Ok(report)
}

async fn load(store: &Arc<dyn CursorStore>, key: &str) -> Result<Option<ItemKey>, StoreError> {
    let store = Arc::clone(store);
    let key = key.to_string();
    blocking(move || store.load(&key)).await
}

async fn persist(
    store: &Arc<dyn CursorStore>,
    key: &str,
    progress: &DeliveryProgress,
) -> Result<(), CycleError> {
    let Some(next) = progress.pending_save() else {
        return Ok(());
    };
    let (store, key, cursor) = (Arc::clone(store), key.to_string(), next.clone());
    blocking(move || store.save(&key, &cursor))
        .await
        .map_err(|source| CycleError::Persist {
            attempted: next.clone(),
            delivered: progress.delivered(),
            source,
        })
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, StoreError> {
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(StoreError::Unavailable(format!("store task failed: {e}"))))
}
