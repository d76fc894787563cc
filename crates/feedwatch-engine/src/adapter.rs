//! Source adapter seam: one implementation per provider.

use async_trait::async_trait;

use feedwatch_core::{Entry, ItemKey, SourceError};

/// Fetches items newer than a cursor from one external feed.
///
/// Contract:
/// - `cursor = None` asks for the most recent items only, never full history.
/// - With a cursor, the provider's native "since" filter is used; the engine
///   still drops anything at or behind the cursor.
/// - At most `limit` entries are returned. Order is not trusted; the engine
///   sorts by key.
/// - An entry that fails to parse is returned as `Err(MalformedItem)` rather
///   than failing the whole call.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider label for logs (`posts`, `videos`, `schedule`).
    fn provider(&self) -> &str;

    async fn fetch_since(
        &self,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> Result<Vec<Entry>, SourceError>;
}
