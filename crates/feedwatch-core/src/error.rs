//! Error classification shared by adapters, sinks and the cycle runner.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ItemKey;

// ─── Classification ──────────────────────────────────────────────────

/// How a failure is handled.
///
/// - `Transient`: skip this cycle, keep the cursor, retry on a later tick.
/// - `Permanent`: disable the source until an operator restarts it.
/// - `MalformedItem`: skip that one item, keep processing the batch.
/// - `PersistenceFailure`: abort the cycle, discard in-memory progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    MalformedItem,
    PersistenceFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::MalformedItem => "malformed_item",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

/// Classify a non-success HTTP status.
///
/// Timeouts, throttling and server errors are transient. Every other client
/// error (bad credentials, unknown account, rejected parameters) will not fix
/// itself by retrying and is permanent.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        408 | 425 | 429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

// ─── Source Errors ───────────────────────────────────────────────────

/// A failed `fetch_since` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("transient source failure{}: {detail}", fmt_status(.status))]
    Transient {
        detail: String,
        status: Option<u16>,
        /// Provider-requested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    #[error("permanent source failure{}: {detail}", fmt_status(.status))]
    Permanent { detail: String, status: Option<u16> },
}

impl SourceError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient {
            detail: detail.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Permanent {
            detail: detail.into(),
            status: None,
        }
    }

    /// Build from a non-success HTTP status using [`classify_status`].
    pub fn from_status(status: u16, detail: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match classify_status(status) {
            ErrorKind::Transient => Self::Transient {
                detail: detail.into(),
                status: Some(status),
                retry_after,
            },
            _ => Self::Permanent {
                detail: detail.into(),
                status: Some(status),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Permanent { .. } => ErrorKind::Permanent,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            Self::Permanent { .. } => None,
        }
    }
}

// ─── Delivery Errors ─────────────────────────────────────────────────

/// Classify a non-success status returned by a notification target.
///
/// Only a missing or unauthorised target is permanent. Other client errors
/// are the target refusing one item's content, which says nothing about the
/// next item, so they are reported as [`ErrorKind::MalformedItem`].
pub fn classify_delivery_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 | 404 | 410 => ErrorKind::Permanent,
        408 | 425 | 429 => ErrorKind::Transient,
        400..=499 => ErrorKind::MalformedItem,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// The sink refused or failed to accept an item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("transient delivery failure{}: {detail}", fmt_status(.status))]
    Transient {
        detail: String,
        status: Option<u16>,
        /// Target-requested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// The target accepted the request but refused this item.
    #[error("item rejected by target{}: {detail}", fmt_status(.status))]
    Rejected { detail: String, status: Option<u16> },

    /// The target is gone or the sink is misconfigured.
    #[error("permanent delivery failure{}: {detail}", fmt_status(.status))]
    Permanent { detail: String, status: Option<u16> },
}

impl DeliveryError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient {
            detail: detail.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Permanent {
            detail: detail.into(),
            status: None,
        }
    }

    /// Build from a non-success HTTP status using [`classify_delivery_status`].
    pub fn from_status(status: u16, detail: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let detail = detail.into();
        match classify_delivery_status(status) {
            ErrorKind::Transient => Self::Transient {
                detail,
                status: Some(status),
                retry_after,
            },
            ErrorKind::MalformedItem => Self::Rejected {
                detail,
                status: Some(status),
            },
            _ => Self::Permanent {
                detail,
                status: Some(status),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Rejected { .. } => ErrorKind::MalformedItem,
            Self::Permanent { .. } => ErrorKind::Permanent,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. }
            | Self::Rejected { status, .. }
            | Self::Permanent { status, .. } => *status,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// ─── Cursor Errors ───────────────────────────────────────────────────

/// Cursor contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// Attempted to move the cursor backward or hold it in place.
    #[error("non-monotonic cursor: current={current}, attempted={attempted}")]
    NonMonotonic { current: ItemKey, attempted: ItemKey },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}
