//! TOML configuration: defaults, per-source overrides, provider and target
//! selection. Credentials are never stored in the file, only the names of
//! the environment variables holding them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use feedwatch_core::{BackoffPolicy, BaselinePolicy, SourceDescriptor};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Cursor files live under `<state_dir>/cursors`.
    pub state_dir: PathBuf,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Defaults {
    pub interval_secs: u64,
    pub batch_limit: usize,
    pub baseline: BaselinePolicy,
    pub backoff_threshold: u32,
    pub backoff_ceiling_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Shift applied to timestamps shown in notifications.
    pub display_offset_hours: i32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            batch_limit: 5,
            baseline: BaselinePolicy::SkipBacklog,
            backoff_threshold: feedwatch_core::backoff::DEFAULT_BACKOFF_THRESHOLD,
            backoff_ceiling_secs: feedwatch_core::backoff::DEFAULT_BACKOFF_CEILING.as_secs(),
            shutdown_grace_secs: 10,
            display_offset_hours: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub id: String,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub target: TargetConfig,
    pub interval_secs: Option<u64>,
    pub batch_limit: Option<usize>,
    pub baseline: Option<BaselinePolicy>,
    pub backoff_threshold: Option<u32>,
    pub backoff_ceiling_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Posts {
        username: String,
        token_env: String,
        base_url: Option<String>,
    },
    Videos {
        channel_id: String,
        key_env: String,
        base_url: Option<String>,
    },
    Schedule {
        base_url: Option<String>,
        #[serde(default = "default_provider_offset")]
        utc_offset_hours: i32,
        #[serde(default = "default_window_hours")]
        window_hours: u32,
    },
}

fn default_provider_offset() -> i32 {
    9
}

fn default_window_hours() -> u32 {
    168
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Posts { .. } => "posts",
            Self::Videos { .. } => "videos",
            Self::Schedule { .. } => "schedule",
        }
    }

    /// Environment variable holding this provider's credential, if it needs one.
    pub fn credential_env(&self) -> Option<&str> {
        match self {
            Self::Posts { token_env, .. } => Some(token_env.as_str()),
            Self::Videos { key_env, .. } => Some(key_env.as_str()),
            Self::Schedule { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    #[default]
    Log,
    Webhook {
        url_env: String,
        /// Stable name for the cursor key; defaults to `url_env`.
        name: Option<String>,
    },
}

impl TargetConfig {
    /// Identifies the target in the cursor key.
    pub fn key(&self) -> String {
        match self {
            Self::Log => "log".to_string(),
            Self::Webhook { url_env, name } => {
                format!("webhook:{}", name.as_deref().unwrap_or(url_env))
            }
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!("no [[sources]] configured");
        }
        check_offset("defaults.display_offset_hours", self.defaults.display_offset_hours)?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            let id = source.id.as_str();
            if id.is_empty() || id.contains('@') || id.chars().any(char::is_whitespace) {
                anyhow::bail!("source id {id:?} must be non-empty without '@' or whitespace");
            }
            if !seen.insert(id) {
                anyhow::bail!("duplicate source id {id:?}");
            }

            let descriptor = self.descriptor(source);
            if descriptor.interval.is_zero() {
                anyhow::bail!("source {id}: interval_secs must be greater than zero");
            }
            if descriptor.batch_limit == 0 {
                anyhow::bail!("source {id}: batch_limit must be greater than zero");
            }
            if descriptor.backoff.ceiling < descriptor.interval {
                anyhow::bail!(
                    "source {id}: backoff_ceiling_secs ({}) is below interval_secs ({})",
                    descriptor.backoff.ceiling.as_secs(),
                    descriptor.interval.as_secs()
                );
            }
            if let Some(env) = source.provider.credential_env()
                && env.is_empty()
            {
                anyhow::bail!("source {id}: credential variable name is empty");
            }
            if let TargetConfig::Webhook { url_env, .. } = &source.target
                && url_env.is_empty()
            {
                anyhow::bail!("source {id}: target url_env is empty");
            }
            if let ProviderConfig::Schedule {
                utc_offset_hours, ..
            } = &source.provider
            {
                check_offset(&format!("source {id}: utc_offset_hours"), *utc_offset_hours)?;
            }
        }
        Ok(())
    }

    /// Effective descriptor: per-source overrides on top of `[defaults]`.
    pub fn descriptor(&self, source: &SourceConfig) -> SourceDescriptor {
        let d = &self.defaults;
        SourceDescriptor {
            id: source.id.clone(),
            provider: source.provider.kind().to_string(),
            target: source.target.key(),
            interval: Duration::from_secs(source.interval_secs.unwrap_or(d.interval_secs)),
            batch_limit: source.batch_limit.unwrap_or(d.batch_limit),
            baseline: source.baseline.unwrap_or(d.baseline),
            backoff: BackoffPolicy {
                threshold: source.backoff_threshold.unwrap_or(d.backoff_threshold),
                ceiling: Duration::from_secs(
                    source.backoff_ceiling_secs.unwrap_or(d.backoff_ceiling_secs),
                ),
            },
        }
    }

    pub fn cursor_dir(&self) -> PathBuf {
        self.state_dir.join("cursors")
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.defaults.shutdown_grace_secs)
    }

    pub fn display_offset(&self) -> FixedOffset {
        hours_offset(self.defaults.display_offset_hours).unwrap_or_else(|| Utc.fix())
    }
}

pub fn hours_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

fn check_offset(field: &str, hours: i32) -> anyhow::Result<()> {
    if !(-23..=23).contains(&hours) {
        anyhow::bail!("{field} must be between -23 and 23, got {hours}");
    }
    Ok(())
}
