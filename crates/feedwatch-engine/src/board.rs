//! Shared status board: one [`SourceStatus`] per source, read by the status
//! server and written by source tasks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use feedwatch_core::{SourceDescriptor, SourceStatus};

#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<BTreeMap<String, SourceStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: &SourceDescriptor) {
        let status = SourceStatus::new(&descriptor.id, &descriptor.provider);
        self.lock().insert(descriptor.id.clone(), status);
    }

    /// Register a source that never starts (missing credentials, unknown sink).
    pub fn register_disabled(&self, id: &str, provider: &str, reason: impl Into<String>) {
        let mut status = SourceStatus::new(id, provider);
        status.disable(reason);
        self.lock().insert(id.to_string(), status);
    }

    /// Apply `f` to the status of `id`. `None` if the source is unknown.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut SourceStatus) -> R) -> Option<R> {
        self.lock().get_mut(id).map(f)
    }

    pub fn get(&self, id: &str) -> Option<SourceStatus> {
        self.lock().get(id).cloned()
    }

    /// All statuses, ordered by source id.
    pub fn snapshot(&self) -> Vec<SourceStatus> {
        self.lock().values().cloned().collect()
    }

    pub fn disabled_count(&self) -> usize {
        self.lock().values().filter(|s| s.is_disabled()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, SourceStatus>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;
    use chrono::Utc;
    use feedwatch_core::SourceState;

    #[test]
    fn snapshot_sorted_by_id() {
        let board = StatusBoard::new();
        board.register(&descriptor("videos"));
        board.register(&descriptor("posts"));
        let ids: Vec<String> = board.snapshot().into_iter().map(|s| s.source_id).collect();
        assert_eq!(ids, vec!["posts", "videos"]);
    }

    #[test]
    fn update_is_visible_through_clones() {
        let board = StatusBoard::new();
        board.register(&descriptor("posts"));
        let handle = board.clone();
        assert_eq!(handle.update("posts", |s| s.begin_cycle(Utc::now())), Some(true));
        assert_eq!(board.get("posts").expect("status").state, SourceState::Running);
        assert_eq!(board.update("missing", |_| ()), None);
    }

    #[test]
    fn disabled_registration_counts() {
        let board = StatusBoard::new();
        board.register(&descriptor("posts"));
        board.register_disabled("videos", "videos", "FEEDWATCH_VIDEOS_KEY is not set");
        assert_eq!(board.disabled_count(), 1);
        let status = board.get("videos").expect("status");
        assert_eq!(
            status.disabled_reason.as_deref(),
            Some("FEEDWATCH_VIDEOS_KEY is not set")
        );
    }
}
