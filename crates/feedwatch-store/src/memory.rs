//! Volatile cursor store for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use feedwatch_core::ItemKey;

use crate::CursorStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, ItemKey>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cursor, as if a previous run had saved it.
    pub fn with_cursor(self, key: &str, cursor: ItemKey) -> Self {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), cursor);
        self
    }

    /// Current cursor for `key`, bypassing the trait.
    pub fn get(&self, key: &str) -> Option<ItemKey> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self, key: &str) -> Result<Option<ItemKey>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, cursor: &ItemKey) -> Result<(), StoreError> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), cursor.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unset_until_saved() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.load("k").expect("load"), None);
        store.save("k", &ItemKey::Seq(3)).expect("save");
        assert_eq!(store.load("k").expect("load"), Some(ItemKey::Seq(3)));
    }

    #[test]
    fn seeded_cursor_visible_through_arc() {
        let store = Arc::new(MemoryCursorStore::new().with_cursor("k", ItemKey::Seq(9)));
        let dyn_store: Arc<dyn CursorStore> = store.clone();
        assert_eq!(dyn_store.load("k").expect("load"), Some(ItemKey::Seq(9)));
        assert_eq!(store.get("k"), Some(ItemKey::Seq(9)));
    }
}
