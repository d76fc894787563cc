//! Shared HTTP plumbing: client construction, status handling, error
//! classification and response-shape normalization.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use feedwatch_core::{Entry, SourceError};

/// Per-request timeout used by [`client`].
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on pages followed in one fetch while draining a backlog.
///
/// With a cursor every page up to the cursor must be read before the oldest
/// pending items are known, so hitting this bound with a page token still
/// outstanding fails the fetch (see [`backlog_overflow`]).
pub(crate) const MAX_PAGES: usize = 40;

const DETAIL_LIMIT: usize = 300;

/// Build the HTTP client shared by all adapters.
pub fn client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("feedwatch/", env!("CARGO_PKG_VERSION")))
        .build()
}

// =============================================================================
// Request / Response
// =============================================================================

/// A non-success response, with the body kept for provider-specific
/// classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpFailure {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl HttpFailure {
    pub fn detail(&self) -> String {
        truncate(self.body.trim())
    }

    /// Default classification by status code.
    pub fn into_source_error(self) -> SourceError {
        let detail = self.detail();
        SourceError::from_status(self.status, detail, self.retry_after)
    }
}

/// The backlog behind the cursor is deeper than [`MAX_PAGES`]. Returning the
/// pages read so far would hand the engine a slice from the middle of the
/// backlog and move the cursor past everything older, so the fetch fails
/// and is retried with backoff instead.
pub(crate) fn backlog_overflow() -> SourceError {
    SourceError::transient(format!(
        "backlog exceeds {MAX_PAGES} pages; oldest pending items not reached"
    ))
}

/// Send a request, mapping transport failures.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, SourceError> {
    request.send().await.map_err(transport_error)
}

/// Split a response into success or an [`HttpFailure`].
pub(crate) async fn check(response: Response) -> Result<Response, HttpFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after(response.headers(), Utc::now());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unreadable error body".to_string());
    Err(HttpFailure {
        status: status.as_u16(),
        body,
        retry_after,
    })
}

/// Deserialize a success body. A body that is not the expected shape at all
/// fails the whole fetch; individual items are parsed separately.
pub(crate) async fn json<T: DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SourceError::transient(format!("unexpected response body: {e}")))
}

/// Timeouts and connection problems are transient; a request that could not
/// even be built is a configuration problem.
pub(crate) fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_builder() {
        return SourceError::permanent(format!("invalid request: {e}"));
    }
    if e.is_timeout() {
        return SourceError::transient(format!("request timed out: {e}"));
    }
    SourceError::transient(format!("request failed: {e}"))
}

/// Provider wait hint: `retry-after` in seconds, else `x-rate-limit-reset`
/// as a unix timestamp.
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };
    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs.max(0).unsigned_abs()));
    }
    let reset = header("x-rate-limit-reset")?;
    let wait = reset.saturating_sub(now.timestamp()).max(0);
    Some(Duration::from_secs(wait.unsigned_abs()))
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= DETAIL_LIMIT {
        return s.to_string();
    }
    let mut out: String = s.chars().take(DETAIL_LIMIT).collect();
    out.push('…');
    out
}

// =============================================================================
// Shapes
// =============================================================================

/// A field some providers send as a single object and sometimes as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(one) => vec![one],
        }
    }
}

/// Bound a fetched batch to `limit` items. With a cursor the oldest are kept
/// so a backlog drains in order; without one the newest are kept. Malformed
/// entries are always passed through so they get reported.
pub(crate) fn bound_batch(entries: Vec<Entry>, limit: usize, has_cursor: bool) -> Vec<Entry> {
    let (mut items, malformed): (Vec<Entry>, Vec<Entry>) =
        entries.into_iter().partition(|e| e.is_ok());
    items.sort_by(|a, b| match (a, b) {
        (Ok(a), Ok(b)) => a.key.cmp(&b.key),
        _ => std::cmp::Ordering::Equal,
    });
    if items.len() > limit {
        if has_cursor {
            items.truncate(limit);
        } else {
            items.drain(..items.len() - limit);
        }
    }
    items.extend(malformed);
    items
}
