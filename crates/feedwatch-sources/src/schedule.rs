//! Scheduled-event feed adapter (stellight.fans broadcast schedule).
//!
//! Each fetch looks at events starting within `window_hours` from now.
//! Schedule ids are issued in increasing order, so a newly announced event
//! always carries a key above the cursor. Performer names come from the
//! streamer directory, cached and refreshed when an unknown id shows up.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use feedwatch_core::{Entry, Item, ItemKey, MalformedItem, Payload, SourceError};
use feedwatch_engine::SourceAdapter;

use crate::http::{self, OneOrMany};

pub const DEFAULT_BASE_URL: &str = "https://stellight.fans";

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub base_url: String,
    /// Zone the provider's naive timestamps are expressed in.
    pub utc_offset: FixedOffset,
    pub window_hours: u32,
}

pub struct ScheduleAdapter {
    client: Client,
    config: ScheduleConfig,
    directory: Mutex<HashMap<String, String>>,
}

impl ScheduleAdapter {
    pub fn new(client: Client, mut config: ScheduleConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client,
            config,
            directory: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch_schedules(&self, now: DateTime<Utc>) -> Result<Vec<serde_json::Value>, SourceError> {
        let (after, before) = window(now, self.config.utc_offset, self.config.window_hours);
        let url = format!("{}/api/v1/schedules", self.config.base_url);
        let request = self.client.get(url).query(&[
            ("startDateTimeAfter", after.as_str()),
            ("startDateTimeBefore", before.as_str()),
        ]);
        let response = http::check(http::send(request).await?)
            .await
            .map_err(http::HttpFailure::into_source_error)?;
        let body: Option<OneOrMany<serde_json::Value>> = http::json(response).await?;
        Ok(body.map(OneOrMany::into_vec).unwrap_or_default())
    }

    async fn fetch_directory(&self) -> Result<HashMap<String, String>, SourceError> {
        let url = format!("{}/api/v1/stellars", self.config.base_url);
        let response = http::check(http::send(self.client.get(url)).await?)
            .await
            .map_err(http::HttpFailure::into_source_error)?;
        let entries: Vec<DirectoryEntry> = http::json(response).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let id = id_string(&e.id)?;
                let name = e.name_kor.or(e.name)?;
                Some((id, name))
            })
            .collect())
    }

    /// Names for `ids`, refreshing the directory once if any are unknown.
    /// A failed refresh keeps the stale directory.
    async fn resolve_names(&self, ids: &[&str]) -> HashMap<String, String> {
        let mut directory = self.directory.lock().await;
        if ids.iter().any(|id| !directory.contains_key(*id)) {
            match self.fetch_directory().await {
                Ok(fresh) => {
                    tracing::debug!(performers = fresh.len(), "refreshed performer directory");
                    *directory = fresh;
                }
                Err(e) => tracing::warn!("performer directory refresh failed: {e}"),
            }
        }
        directory.clone()
    }
}

#[async_trait]
impl SourceAdapter for ScheduleAdapter {
    fn provider(&self) -> &str {
        "schedule"
    }

    async fn fetch_since(
        &self,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> Result<Vec<Entry>, SourceError> {
        let now = Utc::now();
        let parsed: Vec<Result<RawEvent, MalformedItem>> = self
            .fetch_schedules(now)
            .await?
            .into_iter()
            .map(|raw| parse_event(raw, self.config.utc_offset))
            .collect();

        let ids: Vec<&str> = parsed
            .iter()
            .filter_map(|p| p.as_ref().ok()?.performer_id.as_deref())
            .collect();
        let names = if ids.is_empty() {
            HashMap::new()
        } else {
            self.resolve_names(&ids).await
        };

        let entries = parsed
            .into_iter()
            .map(|p| p.map(|event| event.into_item(&names, now)))
            .collect();
        Ok(http::bound_batch(entries, limit, cursor.is_some()))
    }
}

/// `(startDateTimeAfter, startDateTimeBefore)` in the provider's local time.
fn window(now: DateTime<Utc>, offset: FixedOffset, hours: u32) -> (String, String) {
    let start = now.with_timezone(&offset);
    let end = start + TimeDelta::hours(i64::from(hours));
    (
        start.format(LOCAL_FORMAT).to_string(),
        end.format(LOCAL_FORMAT).to_string(),
    )
}

// ─── Wire Shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryEntry {
    id: serde_json::Value,
    name_kor: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    id: serde_json::Value,
    stellar_id: Option<serde_json::Value>,
    #[serde(default)]
    title: String,
    start_date_time: String,
}

#[derive(Debug, Clone, PartialEq)]
struct RawEvent {
    seq: u64,
    performer_id: Option<String>,
    title: String,
    starts_at: DateTime<Utc>,
}

impl RawEvent {
    fn into_item(self, names: &HashMap<String, String>, observed_at: DateTime<Utc>) -> Item {
        let performer = self
            .performer_id
            .as_ref()
            .and_then(|id| names.get(id).cloned())
            .or(self.performer_id)
            .unwrap_or_else(|| "unknown".to_string());
        Item {
            key: ItemKey::Seq(self.seq),
            payload: Payload::Event {
                performer,
                title: self.title,
                starts_at: self.starts_at,
            },
            observed_at,
        }
    }
}

fn id_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn parse_event(raw: serde_json::Value, offset: FixedOffset) -> Result<RawEvent, MalformedItem> {
    let raw_id = raw.get("id").and_then(id_string);
    let schedule: RawSchedule = serde_json::from_value(raw)
        .map_err(|e| MalformedItem::new(raw_id.clone(), e.to_string()))?;
    let seq = raw_id
        .as_deref()
        .and_then(|id| id.parse::<u64>().ok())
        .ok_or_else(|| MalformedItem::new(raw_id.clone(), "schedule id is not numeric"))?;
    let starts_at = parse_start(&schedule.start_date_time, offset).ok_or_else(|| {
        MalformedItem::new(
            raw_id.clone(),
            format!("unparseable startDateTime {:?}", schedule.start_date_time),
        )
    })?;

    Ok(RawEvent {
        seq,
        performer_id: schedule.stellar_id.as_ref().and_then(id_string),
        title: schedule.title,
        starts_at,
    })
}

/// RFC 3339 if an offset is present, otherwise local time in `offset`.
fn parse_start(s: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|at| at.with_timezone(&Utc))
}
