//! Baseline, filtering and ordering of one fetched batch.
//!
//! [`plan_cycle`] is the synchronous heart of a polling cycle: given the
//! stored cursor and whatever the adapter returned, it decides whether to
//! record a baseline, or which items to hand to the sink and in what order.
//! Delivery itself and cursor persistence happen in the engine.

use crate::types::{BaselinePolicy, Entry, Item, ItemKey, MalformedItem};

/// What a cycle should do with a fetched batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CyclePlan {
    /// First cycle: persist `cursor` and deliver nothing.
    Baseline {
        cursor: ItemKey,
        skipped: Vec<MalformedItem>,
    },
    /// First cycle, but the source returned nothing usable. Cursor stays unset.
    AwaitBaseline { skipped: Vec<MalformedItem> },
    /// Deliver `items` in the given (strictly ascending) order.
    Deliver {
        items: Vec<Item>,
        skipped: Vec<MalformedItem>,
        /// Items at or behind the cursor that were dropped.
        stale: usize,
        /// Items whose key repeated an earlier item in the batch.
        duplicates: usize,
        /// Items beyond `limit`, left for a later cycle.
        deferred: usize,
    },
}

impl CyclePlan {
    pub fn skipped(&self) -> &[MalformedItem] {
        match self {
            Self::Baseline { skipped, .. }
            | Self::AwaitBaseline { skipped }
            | Self::Deliver { skipped, .. } => skipped,
        }
    }
}

/// Plan a cycle for a batch fetched at `cursor`.
///
/// Steps, in order:
/// 1. Split out malformed entries (they are reported, never delivered).
/// 2. With no cursor and [`BaselinePolicy::SkipBacklog`], return the newest
///    key as the baseline (or [`CyclePlan::AwaitBaseline`] when empty).
/// 3. Drop items with `key <= cursor`.
/// 4. Stable-sort ascending by key; an item repeating the previous key is
///    treated as already delivered.
/// 5. Keep the `limit` lowest keys; the rest drain on later cycles.
pub fn plan_cycle(
    cursor: Option<&ItemKey>,
    entries: Vec<Entry>,
    limit: usize,
    baseline: BaselinePolicy,
) -> CyclePlan {
    let mut items = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for entry in entries {
        match entry {
            Ok(item) => items.push(item),
            Err(malformed) => skipped.push(malformed),
        }
    }

    if cursor.is_none() && baseline == BaselinePolicy::SkipBacklog {
        return match items.into_iter().map(|i| i.key).max() {
            Some(cursor) => CyclePlan::Baseline { cursor, skipped },
            None => CyclePlan::AwaitBaseline { skipped },
        };
    }

    let before = items.len();
    if let Some(cursor) = cursor {
        items.retain(|item| item.key > *cursor);
    }
    let stale = before - items.len();

    // Stable: equal keys keep adapter order, so the first one wins.
    items.sort_by(|a, b| a.key.cmp(&b.key));
    let before = items.len();
    items.dedup_by(|later, earlier| later.key == earlier.key);
    let duplicates = before - items.len();

    let deferred = items.len().saturating_sub(limit);
    items.truncate(limit);

    CyclePlan::Deliver {
        items,
        skipped,
        stale,
        duplicates,
        deferred,
    }
}
