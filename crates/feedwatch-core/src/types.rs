use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;

// ─── Item Key / Cursor ────────────────────────────────────────────

/// Totally ordered position of an item within one source.
///
/// A persisted `ItemKey` is the source's cursor: everything up to and
/// including it has been delivered. An absent cursor (`None` wherever an
/// `Option<ItemKey>` appears) means no baseline has been recorded yet.
///
/// A single source always issues keys of one variant. `Seq` is used when the
/// provider hands out monotonically increasing numeric ids; `Time` when only
/// a publication timestamp orders items, with the provider id breaking ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKey {
    Seq(u64),
    Time { at: DateTime<Utc>, id: String },
}

impl ItemKey {
    pub fn time(at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self::Time { at, id: id.into() }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(seq) => write!(f, "{seq}"),
            Self::Time { at, id } => write!(f, "{}/{id}", at.to_rfc3339()),
        }
    }
}

/// Render an optional cursor for logs and status output.
pub fn display_cursor(cursor: Option<&ItemKey>) -> String {
    cursor.map_or_else(|| "unset".to_string(), ToString::to_string)
}

// ─── Item ─────────────────────────────────────────────────────────

/// Provider-specific fields carried through to the sink untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// A social post (timeline entry).
    Post {
        author: String,
        text: String,
        url: String,
        created_at: Option<DateTime<Utc>>,
    },
    /// A published video.
    Video {
        channel: String,
        title: String,
        url: String,
        published_at: DateTime<Utc>,
    },
    /// A scheduled broadcast or event.
    Event {
        performer: String,
        title: String,
        starts_at: DateTime<Utc>,
    },
}

impl Payload {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Post { .. } => "post",
            Self::Video { .. } => "video",
            Self::Event { .. } => "event",
        }
    }

    /// Provider timestamp for the item, if the provider sent one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Post { created_at, .. } => *created_at,
            Self::Video { published_at, .. } => Some(*published_at),
            Self::Event { starts_at, .. } => Some(*starts_at),
        }
    }
}

/// One deliverable item fetched from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub payload: Payload,
    /// When this process fetched the item.
    pub observed_at: DateTime<Utc>,
}

/// An entry the adapter could not turn into an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedItem {
    /// Whatever id the provider sent, if any was readable.
    pub raw_id: Option<String>,
    pub reason: String,
}

impl MalformedItem {
    pub fn new(raw_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            raw_id,
            reason: reason.into(),
        }
    }
}

/// Adapter output element: a parsed item, or a single entry that failed to parse.
pub type Entry = Result<Item, MalformedItem>;

// ─── Source Descriptor ────────────────────────────────────────────

/// What to do on the first cycle of a source with no stored cursor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Record the newest available key and deliver nothing.
    #[default]
    SkipBacklog,
    /// Deliver whatever the first fetch returns.
    None,
}

/// Static, provider-independent configuration of one polled source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: String,
    /// Provider label for logs and status (`posts`, `videos`, `schedule`).
    pub provider: String,
    /// Identifies the delivery target; part of the cursor key.
    pub target: String,
    pub interval: Duration,
    pub batch_limit: usize,
    pub baseline: BaselinePolicy,
    pub backoff: BackoffPolicy,
}

impl SourceDescriptor {
    /// Cursor store key: one cursor per source per target.
    pub fn cursor_key(&self) -> String {
        format!("{}@{}", self.id, self.target)
    }
}
