//! Daemon wiring: config → adapters, sinks, scheduler, status socket.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use feedwatch_engine::{
    NotificationSink, Scheduler, SourceAdapter, SourceTask, StatusBoard,
};
use feedwatch_sources::{
    PostsAdapter, PostsConfig, ScheduleAdapter, ScheduleConfig, VideosAdapter, VideosConfig,
    posts, schedule, videos,
};
use feedwatch_store::{CursorStore, FileCursorStore};

use crate::config::{Config, ProviderConfig, SourceConfig, TargetConfig, hours_offset};
use crate::server;
use crate::sinks::{LogSink, WebhookSink};

/// Process environment lookup; empty values count as unset.
pub(crate) fn lookup_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Run until ctrl-c/SIGTERM, then stop sources within the grace period.
pub async fn run_daemon(config_path: &Path, socket_path: &str) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let store: Arc<dyn CursorStore> = Arc::new(FileCursorStore::open(config.cursor_dir())?);
    let client = feedwatch_sources::client(feedwatch_sources::REQUEST_TIMEOUT)?;
    let board = StatusBoard::new();
    let (ready_tx, ready_rx) = watch::channel(false);

    let mut scheduler = Scheduler::new(store, board.clone(), ready_rx);
    for source in &config.sources {
        match build_task(&config, source, &client, &lookup_env) {
            Ok(task) => scheduler.spawn(task),
            Err(reason) => {
                tracing::error!(source = %source.id, "source disabled at startup: {reason}");
                board.register_disabled(&source.id, source.provider.kind(), reason);
            }
        }
    }
    if scheduler.is_empty() {
        tracing::warn!("no runnable sources; serving status only");
    }

    let listener = server::bind(socket_path).await?;
    let server_shutdown = CancellationToken::new();
    let mut server_handle = tokio::spawn(server::run_server(
        listener,
        board.clone(),
        server_shutdown.clone(),
    ));

    ready_tx.send_replace(true);
    tracing::info!(
        state_dir = %config.state_dir.display(),
        sources = scheduler.len(),
        disabled = board.disabled_count(),
        "feedwatch started"
    );

    tokio::select! {
        signal = shutdown_signal() => signal?,
        joined = &mut server_handle => {
            match joined {
                Ok(Ok(())) => tracing::warn!("status server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!("status server failed: {e}"),
                Err(e) => tracing::error!("status server task failed: {e}"),
            }
        }
    }

    let report = scheduler.shutdown(config.shutdown_grace()).await;
    if report.aborted.is_empty() {
        tracing::info!(finished = report.finished, "all sources stopped");
    } else {
        tracing::warn!(
            finished = report.finished,
            aborted = ?report.aborted,
            "sources aborted after grace period; their last cycle was not saved"
        );
    }

    server_shutdown.cancel();
    server_handle.abort();
    if let Err(e) = std::fs::remove_file(socket_path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("cannot remove socket {socket_path}: {e}");
    }
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => {
                result?;
                tracing::info!("received ctrl-c, shutting down");
            }
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}

// ─── Task Construction ───────────────────────────────────────────────

/// Build one source task. `Err` carries the reason the source is disabled.
pub(crate) fn build_task(
    config: &Config,
    source: &SourceConfig,
    client: &Client,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<SourceTask, String> {
    Ok(SourceTask {
        descriptor: config.descriptor(source),
        adapter: build_adapter(&source.provider, client, env)?,
        sink: build_sink(source, config, client, env)?,
    })
}

fn require(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<String, String> {
    env(name).ok_or_else(|| format!("missing credential: environment variable {name} is not set"))
}

fn build_adapter(
    provider: &ProviderConfig,
    client: &Client,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Arc<dyn SourceAdapter>, String> {
    let adapter: Arc<dyn SourceAdapter> = match provider {
        ProviderConfig::Posts {
            username,
            token_env,
            base_url,
        } => Arc::new(PostsAdapter::new(
            client.clone(),
            PostsConfig {
                base_url: base_url.clone().unwrap_or_else(|| posts::DEFAULT_BASE_URL.to_string()),
                username: username.clone(),
                bearer_token: require(env, token_env)?,
            },
        )),
        ProviderConfig::Videos {
            channel_id,
            key_env,
            base_url,
        } => Arc::new(VideosAdapter::new(
            client.clone(),
            VideosConfig {
                base_url: base_url
                    .clone()
                    .unwrap_or_else(|| videos::DEFAULT_BASE_URL.to_string()),
                channel_id: channel_id.clone(),
                api_key: require(env, key_env)?,
            },
        )),
        ProviderConfig::Schedule {
            base_url,
            utc_offset_hours,
            window_hours,
        } => Arc::new(ScheduleAdapter::new(
            client.clone(),
            ScheduleConfig {
                base_url: base_url
                    .clone()
                    .unwrap_or_else(|| schedule::DEFAULT_BASE_URL.to_string()),
                utc_offset: hours_offset(*utc_offset_hours)
                    .ok_or_else(|| format!("invalid utc_offset_hours {utc_offset_hours}"))?,
                window_hours: *window_hours,
            },
        )),
    };
    Ok(adapter)
}

fn build_sink(
    source: &SourceConfig,
    config: &Config,
    client: &Client,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Arc<dyn NotificationSink>, String> {
    let offset = config.display_offset();
    let sink: Arc<dyn NotificationSink> = match &source.target {
        TargetConfig::Log => Arc::new(LogSink::new(source.id.clone(), offset)),
        TargetConfig::Webhook { url_env, .. } => {
            Arc::new(WebhookSink::new(client.clone(), require(env, url_env)?, offset))
        }
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use feedwatch_core::ItemKey;
    use feedwatch_store::MemoryCursorStore;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> Client {
        feedwatch_sources::client(Duration::from_secs(5)).expect("client")
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    const CONFIG: &str = r#"
state_dir = "/tmp/feedwatch-test"

[[sources]]
id = "posts"
provider = { kind = "posts", username = "StelLive_kr", token_env = "FW_TOKEN" }

[[sources]]
id = "videos"
provider = { kind = "videos", channel_id = "UC1", key_env = "FW_KEY" }
target = { type = "webhook", url_env = "FW_HOOK", name = "main" }

[[sources]]
id = "schedule"
provider = { kind = "schedule" }
"#;

    #[test]
    fn missing_provider_credential_disables_source() {
        let config = Config::parse(CONFIG).expect("parse");
        let err = build_task(&config, &config.sources[0], &http(), &no_env)
            .err()
            .expect("missing token");
        assert!(err.contains("FW_TOKEN"), "{err}");
    }

    #[test]
    fn missing_webhook_url_disables_source() {
        let config = Config::parse(CONFIG).expect("parse");
        let env = |name: &str| (name == "FW_KEY").then(|| "k".to_string());
        let err = build_task(&config, &config.sources[1], &http(), &env)
            .err()
            .expect("missing hook");
        assert!(err.contains("FW_HOOK"), "{err}");
    }

    #[test]
    fn complete_sources_build() {
        let config = Config::parse(CONFIG).expect("parse");
        let env = |name: &str| Some(format!("value-of-{name}"));
        let keys: Vec<String> = config
            .sources
            .iter()
            .map(|s| {
                build_task(&config, s, &http(), &env)
                    .expect("task")
                    .descriptor
                    .cursor_key()
            })
            .collect();
        assert_eq!(keys, vec!["posts@log", "videos@webhook:main", "schedule@log"]);

        // The schedule provider needs no credential at all.
        assert!(build_task(&config, &config.sources[2], &http(), &no_env).is_ok());
    }

    #[tokio::test]
    async fn schedule_to_webhook_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/schedules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 2, "title": "Karaoke", "startDateTime": "2025-03-01T21:00:00"},
                {"id": 1, "title": "Morning talk", "startDateTime": "2025-03-01T09:00:00"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({"embeds": [{"color": 0x9B59B6}]})))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let config = Config::parse(&format!(
            r#"
state_dir = "/tmp/feedwatch-test"

[[sources]]
id = "schedule"
interval_secs = 3600
baseline = "none"
provider = {{ kind = "schedule", base_url = "{uri}" }}
target = {{ type = "webhook", url_env = "FW_HOOK" }}
"#,
            uri = server.uri()
        ))
        .expect("parse");
        let hook = format!("{}/hook", server.uri());
        let env = move |name: &str| (name == "FW_HOOK").then(|| hook.clone());
        let task = build_task(&config, &config.sources[0], &http(), &env).expect("task");
        let key = task.descriptor.cursor_key();

        let store = Arc::new(MemoryCursorStore::new());
        let (ready_tx, ready_rx) = watch::channel(true);
        let mut scheduler = Scheduler::new(store.clone(), StatusBoard::new(), ready_rx);
        scheduler.spawn(task);

        let board = scheduler.board().clone();
        tokio::time::timeout(Duration::from_secs(10), async {
            while board.get("schedule").map_or(0, |s| s.delivered_total) < 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("two deliveries");

        let report = scheduler.shutdown(Duration::from_secs(5)).await;
        assert!(report.aborted.is_empty());
        drop(ready_tx);

        assert_eq!(store.load(&key).expect("load"), Some(ItemKey::Seq(2)));
        let status = board.get("schedule").expect("status");
        assert_eq!(status.cursor, Some(ItemKey::Seq(2)));
        assert_eq!(status.consecutive_failures, 0);
    }
}
