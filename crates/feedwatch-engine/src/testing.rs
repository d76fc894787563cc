//! Fakes for the adapter, sink and store seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use feedwatch_core::{
    BackoffPolicy, BaselinePolicy, DeliveryError, Entry, Item, ItemKey, MalformedItem, Payload,
    SourceDescriptor, SourceError,
};
use feedwatch_store::{CursorStore, MemoryCursorStore, StoreError};

use crate::adapter::SourceAdapter;
use crate::sink::NotificationSink;

pub(crate) fn post(seq: u64) -> Entry {
    Ok(Item {
        key: ItemKey::Seq(seq),
        payload: Payload::Post {
            author: "someone".into(),
            text: format!("post {seq}"),
            url: format!("https://example.test/status/{seq}"),
            created_at: None,
        },
        observed_at: Utc::now(),
    })
}

pub(crate) fn posts(seqs: &[u64]) -> Vec<Entry> {
    seqs.iter().copied().map(post).collect()
}

pub(crate) fn malformed(raw: &str) -> Entry {
    Err(MalformedItem::new(Some(raw.into()), "id is not numeric"))
}

pub(crate) fn descriptor(id: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.into(),
        provider: "posts".into(),
        target: "log".into(),
        interval: Duration::from_secs(10),
        batch_limit: 5,
        baseline: BaselinePolicy::SkipBacklog,
        backoff: BackoffPolicy::default(),
    }
}

// ─── Adapter ────────────────────────────────────────────────────────

/// Returns scripted responses in order, then empty batches.
#[derive(Default)]
pub(crate) struct ScriptedAdapter {
    responses: Mutex<VecDeque<Result<Vec<Entry>, SourceError>>>,
    cursors_seen: Mutex<Vec<Option<ItemKey>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedAdapter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn then(self, response: Result<Vec<Entry>, SourceError>) -> Self {
        self.push(response);
        self
    }

    pub(crate) fn push(&self, response: Result<Vec<Entry>, SourceError>) {
        self.responses.lock().expect("lock").push_back(response);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cursors_seen(&self) -> Vec<Option<ItemKey>> {
        self.cursors_seen.lock().expect("lock").clone()
    }

    /// Highest number of concurrent `fetch_since` calls observed.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn fetch_since(
        &self,
        cursor: Option<&ItemKey>,
        _limit: usize,
    ) -> Result<Vec<Entry>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.cursors_seen.lock().expect("lock").push(cursor.cloned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.responses.lock().expect("lock").pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ─── Sink ───────────────────────────────────────────────────────────

/// Records delivered keys; can fail once on chosen keys, delay or hang.
#[derive(Default)]
pub(crate) struct RecordingSink {
    delivered: Mutex<Vec<ItemKey>>,
    fail_once: Mutex<HashMap<ItemKey, DeliveryError>>,
    delay: Option<Duration>,
    hang: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_once(self, key: ItemKey, error: DeliveryError) -> Self {
        self.fail_once.lock().expect("lock").insert(key, error);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn delivered(&self) -> Vec<ItemKey> {
        self.delivered.lock().expect("lock").clone()
    }

    pub(crate) fn delivered_seqs(&self) -> Vec<u64> {
        self.delivered()
            .into_iter()
            .map(|k| match k {
                ItemKey::Seq(s) => s,
                ItemKey::Time { .. } => panic!("unexpected time key"),
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, item: &Item) -> Result<(), DeliveryError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_once.lock().expect("lock").remove(&item.key) {
            return Err(err);
        }
        self.delivered.lock().expect("lock").push(item.key.clone());
        Ok(())
    }
}

// ─── Store ──────────────────────────────────────────────────────────

/// Memory store with switchable load/save failures.
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryCursorStore,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seeded(key: &str, cursor: ItemKey) -> Self {
        Self {
            inner: MemoryCursorStore::new().with_cursor(key, cursor),
            ..Self::default()
        }
    }

    pub(crate) fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn get(&self, key: &str) -> Option<ItemKey> {
        self.inner.get(key)
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CursorStore for FlakyStore {
    fn load(&self, key: &str) -> Result<Option<ItemKey>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected load failure".into()));
        }
        self.inner.load(key)
    }

    fn save(&self, key: &str, cursor: &ItemKey) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, cursor)
    }
}

pub(crate) fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
