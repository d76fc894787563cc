//! Social-post feed adapter (X/Twitter API v2 user timeline).
//!
//! Keys are the numeric post ids. The username is resolved to a user id on
//! the first fetch and cached for the life of the adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

use feedwatch_core::{Entry, Item, ItemKey, MalformedItem, Payload, SourceError};
use feedwatch_engine::SourceAdapter;

use crate::http::{self, MAX_PAGES, OneOrMany};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// The timeline endpoint only accepts page sizes in this range.
const MIN_RESULTS: usize = 5;
const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone)]
pub struct PostsConfig {
    pub base_url: String,
    pub username: String,
    pub bearer_token: String,
}

pub struct PostsAdapter {
    client: Client,
    config: PostsConfig,
    user_id: OnceCell<String>,
}

impl PostsAdapter {
    pub fn new(client: Client, mut config: PostsConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client,
            config,
            user_id: OnceCell::new(),
        }
    }

    async fn user_id(&self) -> Result<&str, SourceError> {
        let id = self
            .user_id
            .get_or_try_init(|| self.lookup_user_id())
            .await?;
        Ok(id.as_str())
    }

    async fn lookup_user_id(&self) -> Result<String, SourceError> {
        let url = format!(
            "{}/2/users/by/username/{}",
            self.config.base_url, self.config.username
        );
        let request = self.client.get(url).bearer_auth(&self.config.bearer_token);
        let response = http::check(http::send(request).await?)
            .await
            .map_err(http::HttpFailure::into_source_error)?;
        let body: UserResponse = http::json(response).await?;
        match body.data {
            Some(user) => {
                tracing::info!(
                    username = %self.config.username,
                    user_id = %user.id,
                    "resolved post author"
                );
                Ok(user.id)
            }
            None => Err(SourceError::permanent(format!(
                "user {} not found",
                self.config.username
            ))),
        }
    }
}

#[async_trait]
impl SourceAdapter for PostsAdapter {
    fn provider(&self) -> &str {
        "posts"
    }

    async fn fetch_since(
        &self,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> Result<Vec<Entry>, SourceError> {
        let user_id = self.user_id().await?;
        let url = format!("{}/2/users/{user_id}/tweets", self.config.base_url);
        let since_id = match cursor {
            Some(ItemKey::Seq(id)) => Some(id.to_string()),
            _ => None,
        };
        // Draining behind a cursor reads every page, so make them full ones.
        let page_size = match since_id {
            Some(_) => MAX_RESULTS,
            None => limit.clamp(MIN_RESULTS, MAX_RESULTS),
        }
        .to_string();

        let mut entries = Vec::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0;
        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("exclude", "retweets,replies"),
                ("max_results", page_size.as_str()),
                ("tweet.fields", "created_at"),
            ];
            if let Some(since) = &since_id {
                query.push(("since_id", since.as_str()));
            }
            if let Some(token) = &next_token {
                query.push(("pagination_token", token.as_str()));
            }

            let request = self
                .client
                .get(&url)
                .bearer_auth(&self.config.bearer_token)
                .query(&query);
            let response = http::check(http::send(request).await?)
                .await
                .map_err(http::HttpFailure::into_source_error)?;
            let page: TimelineResponse = http::json(response).await?;

            entries.extend(parse_posts(page.data, &self.config.username, Utc::now()));
            next_token = page.meta.and_then(|m| m.next_token);
            pages += 1;
            // Without a cursor only the newest page matters.
            if since_id.is_none() || next_token.is_none() {
                break;
            }
            if pages == MAX_PAGES {
                return Err(http::backlog_overflow());
            }
        }

        Ok(http::bound_batch(entries, limit, cursor.is_some()))
    }
}

// ─── Wire Shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Option<OneOrMany<serde_json::Value>>,
    #[serde(default)]
    meta: Option<TimelineMeta>,
}

#[derive(Debug, Deserialize)]
struct TimelineMeta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    text: String,
    created_at: Option<DateTime<Utc>>,
}

/// Turn the timeline `data` field into entries. Absent data means no posts.
fn parse_posts(
    data: Option<OneOrMany<serde_json::Value>>,
    username: &str,
    observed_at: DateTime<Utc>,
) -> Vec<Entry> {
    let Some(data) = data else {
        return Vec::new();
    };
    data.into_vec()
        .into_iter()
        .map(|raw| parse_post(raw, username, observed_at))
        .collect()
}

fn parse_post(raw: serde_json::Value, username: &str, observed_at: DateTime<Utc>) -> Entry {
    let raw_id = raw.get("id").map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    let post: RawPost = serde_json::from_value(raw)
        .map_err(|e| MalformedItem::new(raw_id.clone(), e.to_string()))?;
    let seq = post
        .id
        .parse::<u64>()
        .map_err(|_| MalformedItem::new(raw_id, "post id is not numeric"))?;

    Ok(Item {
        key: ItemKey::Seq(seq),
        payload: Payload::Post {
            author: username.to_string(),
            text: post.text,
            url: format!("https://twitter.com/{username}/status/{seq}"),
            created_at: post.created_at,
        },
        observed_at,
    })
}
