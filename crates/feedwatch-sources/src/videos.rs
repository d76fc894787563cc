//! Video-publication feed adapter (YouTube Data API v3 `search.list`).
//!
//! Video ids are not ordered, so the key is `(publishedAt, videoId)`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;

use feedwatch_core::{Entry, Item, ItemKey, MalformedItem, Payload, SourceError};
use feedwatch_engine::SourceAdapter;

use crate::http::{self, HttpFailure, MAX_PAGES};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const MAX_RESULTS: usize = 50;

/// Error reasons that clear up once the quota window rolls over.
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "rateLimitExceeded", "userRateLimitExceeded"];

#[derive(Debug, Clone)]
pub struct VideosConfig {
    pub base_url: String,
    pub channel_id: String,
    pub api_key: String,
}

pub struct VideosAdapter {
    client: Client,
    config: VideosConfig,
}

impl VideosAdapter {
    pub fn new(client: Client, mut config: VideosConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { client, config }
    }
}

#[async_trait]
impl SourceAdapter for VideosAdapter {
    fn provider(&self) -> &str {
        "videos"
    }

    async fn fetch_since(
        &self,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> Result<Vec<Entry>, SourceError> {
        let url = format!("{}/youtube/v3/search", self.config.base_url);
        let published_after = match cursor {
            Some(ItemKey::Time { at, .. }) => Some(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            _ => None,
        };
        let page_size = match published_after {
            Some(_) => MAX_RESULTS,
            None => limit.clamp(1, MAX_RESULTS),
        }
        .to_string();

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;
        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("part", "snippet"),
                ("channelId", self.config.channel_id.as_str()),
                ("maxResults", page_size.as_str()),
                ("order", "date"),
                ("type", "video"),
                ("key", self.config.api_key.as_str()),
            ];
            if let Some(after) = &published_after {
                query.push(("publishedAfter", after.as_str()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }

            let response = http::send(self.client.get(&url).query(&query)).await?;
            let response = http::check(response).await.map_err(classify_failure)?;
            let page: SearchResponse = http::json(response).await?;

            let observed_at = Utc::now();
            entries.extend(page.items.into_iter().map(|raw| parse_video(raw, observed_at)));
            page_token = page.next_page_token;
            pages += 1;
            if published_after.is_none() || page_token.is_none() {
                break;
            }
            if pages == MAX_PAGES {
                return Err(http::backlog_overflow());
            }
        }

        Ok(http::bound_batch(entries, limit, cursor.is_some()))
    }
}

/// Quota exhaustion comes back as 403 but is transient; other 403s are not.
fn classify_failure(failure: HttpFailure) -> SourceError {
    if failure.status == 403 && quota_exhausted(&failure.body) {
        return SourceError::Transient {
            detail: failure.detail(),
            status: Some(failure.status),
            retry_after: failure.retry_after,
        };
    }
    failure.into_source_error()
}

fn quota_exhausted(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) else {
        return false;
    };
    parsed
        .error
        .errors
        .iter()
        .any(|e| QUOTA_REASONS.contains(&e.reason.as_str()))
}

// ─── Wire Shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVideo {
    id: RawVideoId,
    snippet: RawSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideoId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnippet {
    published_at: DateTime<Utc>,
    title: String,
    #[serde(default)]
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

fn parse_video(raw: serde_json::Value, observed_at: DateTime<Utc>) -> Entry {
    let raw_id = raw
        .pointer("/id/videoId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let video: RawVideo =
        serde_json::from_value(raw).map_err(|e| MalformedItem::new(raw_id, e.to_string()))?;

    let id = video.id.video_id;
    Ok(Item {
        key: ItemKey::time(video.snippet.published_at, id.clone()),
        payload: Payload::Video {
            channel: unescape_html(&video.snippet.channel_title),
            title: unescape_html(&video.snippet.title),
            url: format!("https://www.youtube.com/watch?v={id}"),
            published_at: video.snippet.published_at,
        },
        observed_at,
    })
}

/// Search snippets arrive HTML-escaped.
fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> VideosAdapter {
        VideosAdapter::new(
            http::client(Duration::from_secs(5)).expect("client"),
            VideosConfig {
                base_url: format!("{}/", server.uri()),
                channel_id: "UC123".into(),
                api_key: "key-abc".into(),
            },
        )
    }

    fn video(id: &str, published: &str, title: &str) -> serde_json::Value {
        json!({
            "id": {"kind": "youtube#video", "videoId": id},
            "snippet": {"publishedAt": published, "title": title, "channelTitle": "Stellive"}
        })
    }

    fn ids(entries: &[Entry]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| match e {
                Ok(Item { key: ItemKey::Time { id, .. }, .. }) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_video_and_unescapes_title() {
        let entry = parse_video(
            video("abc", "2025-03-01T09:00:00Z", "Tom &amp; Jerry&#39;s &quot;show&quot;"),
            Utc::now(),
        );
        let item = entry.expect("item");
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts");
        assert_eq!(item.key, ItemKey::time(at, "abc"));
        let Payload::Video { title, url, .. } = item.payload else {
            panic!("expected video");
        };
        assert_eq!(title, "Tom & Jerry's \"show\"");
        assert_eq!(url, "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn missing_published_at_is_malformed() {
        let entry = parse_video(
            json!({"id": {"videoId": "abc"}, "snippet": {"title": "t"}}),
            Utc::now(),
        );
        let bad = entry.expect_err("malformed");
        assert_eq!(bad.raw_id.as_deref(), Some("abc"));
    }

    #[test]
    fn quota_403_is_transient_other_403_permanent() {
        let quota = HttpFailure {
            status: 403,
            body: json!({"error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}})
                .to_string(),
            retry_after: None,
        };
        assert_eq!(classify_failure(quota).kind(), feedwatch_core::ErrorKind::Transient);

        let forbidden = HttpFailure {
            status: 403,
            body: json!({"error": {"code": 403, "errors": [{"reason": "forbidden"}]}}).to_string(),
            retry_after: None,
        };
        assert_eq!(classify_failure(forbidden).kind(), feedwatch_core::ErrorKind::Permanent);

        let not_json = HttpFailure {
            status: 403,
            body: "<html>denied</html>".into(),
            retry_after: None,
        };
        assert_eq!(classify_failure(not_json).kind(), feedwatch_core::ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn cursor_becomes_published_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/search"))
            .and(query_param("channelId", "UC123"))
            .and(query_param("order", "date"))
            .and(query_param("type", "video"))
            .and(query_param("key", "key-abc"))
            .and(query_param("publishedAfter", "2025-03-01T09:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    video("new2", "2025-03-02T10:00:00Z", "second"),
                    video("new1", "2025-03-02T09:00:00Z", "first"),
                    video("old", "2025-03-01T09:00:00Z", "already seen")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts");
        let cursor = ItemKey::time(at, "old");
        let entries = adapter(&server)
            .fetch_since(Some(&cursor), 5)
            .await
            .expect("fetch");
        // The engine drops "old"; the adapter only orders and bounds.
        assert_eq!(ids(&entries), vec!["old", "new1", "new2"]);
    }

    #[tokio::test]
    async fn deep_backlog_starts_from_oldest_pending_video() {
        let server = MockServer::start().await;
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts");
        let after = base.to_rfc3339_opts(SecondsFormat::Secs, true);

        // 35 uploads after the cursor, newest-first, 5 per page over 7 pages.
        let uploads: Vec<serde_json::Value> = (1..=35i64)
            .rev()
            .map(|n| {
                let published = (base + chrono::Duration::minutes(n))
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
                video(&format!("v{n:02}"), &published, "upload")
            })
            .collect();
        let pages: Vec<&[serde_json::Value]> = uploads.chunks(5).collect();
        for (n, page) in pages.iter().enumerate() {
            let mut body = json!({"items": page});
            if n + 1 < pages.len() {
                body["nextPageToken"] = json!(format!("t{}", n + 1));
            }
            let builder = Mock::given(method("GET"))
                .and(path("/youtube/v3/search"))
                .and(query_param("publishedAfter", after.as_str()));
            let (builder, priority) = match n {
                0 => (builder, 5),
                _ => (builder.and(query_param("pageToken", format!("t{n}"))), 1),
            };
            builder
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .with_priority(priority)
                .expect(1)
                .mount(&server)
                .await;
        }

        let cursor = ItemKey::time(base, "v00");
        let entries = adapter(&server)
            .fetch_since(Some(&cursor), 5)
            .await
            .expect("fetch");
        assert_eq!(ids(&entries), vec!["v01", "v02", "v03", "v04", "v05"]);
    }

    #[tokio::test]
    async fn endless_page_tokens_fail_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [video("x", "2025-03-02T09:00:00Z", "again")],
                "nextPageToken": "more"
            })))
            .expect(MAX_PAGES as u64)
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts");
        let err = adapter(&server)
            .fetch_since(Some(&ItemKey::time(at, "old")), 5)
            .await
            .expect_err("too deep");
        assert_eq!(err.kind(), feedwatch_core::ErrorKind::Transient);
    }

    #[tokio::test]
    async fn quota_exceeded_response_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/search"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "quota", "errors": [{"reason": "quotaExceeded"}]}
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).fetch_since(None, 5).await.expect_err("quota");
        assert_eq!(err.kind(), feedwatch_core::ErrorKind::Transient);
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn bad_key_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/search"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "errors": [{"reason": "keyInvalid"}]}
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).fetch_since(None, 5).await.expect_err("bad key");
        assert_eq!(err.kind(), feedwatch_core::ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn empty_search_yields_no_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "youtube#searchListResponse"})))
            .mount(&server)
            .await;

        let entries = adapter(&server).fetch_since(None, 5).await.expect("fetch");
        assert!(entries.is_empty());
    }
}
