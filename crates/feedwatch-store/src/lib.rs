//! feedwatch-store: durable per-source cursor persistence.
//!
//! [`CursorStore`] is the only state shared between source tasks. Every
//! implementation serializes access per key; distinct keys never contend.

pub mod error;
pub mod file;
pub mod memory;

pub use error::StoreError;
pub use file::FileCursorStore;
pub use memory::MemoryCursorStore;

use feedwatch_core::ItemKey;

/// Atomic single-key cursor persistence.
pub trait CursorStore: Send + Sync {
    /// Read the cursor for `key`. `Ok(None)` means no baseline yet.
    fn load(&self, key: &str) -> Result<Option<ItemKey>, StoreError>;

    /// Replace the cursor for `key`. A crash mid-save leaves either the old
    /// or the new value readable.
    fn save(&self, key: &str, cursor: &ItemKey) -> Result<(), StoreError>;
}

impl<T: CursorStore + ?Sized> CursorStore for std::sync::Arc<T> {
    fn load(&self, key: &str) -> Result<Option<ItemKey>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, cursor: &ItemKey) -> Result<(), StoreError> {
        (**self).save(key, cursor)
    }
}
