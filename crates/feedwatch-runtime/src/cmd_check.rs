//! `feedwatch check`: validate a config without starting anything.
//!
//! Reports, per source, the cursor key, whether the credentials it names are
//! present, and the cursor currently stored for it. Cursors in the store
//! that no configured source uses are listed too (a renamed source or target
//! leaves one behind and starts from a fresh baseline).

use std::collections::BTreeMap;
use std::path::Path;

use feedwatch_core::{ItemKey, display_cursor};
use feedwatch_store::FileCursorStore;

use crate::config::{Config, TargetConfig};
use crate::daemon::lookup_env;

pub fn cmd_check(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    let cursor_dir = config.cursor_dir();
    let stored = if cursor_dir.is_dir() {
        FileCursorStore::open(&cursor_dir)?.list()?
    } else {
        Vec::new()
    };

    let report = build_report(&config, lookup_env, &stored);
    print!("{}", report.render());
    if report.problems > 0 {
        anyhow::bail!("{} problem(s) found in {}", report.problems, config_path.display());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceCheck {
    pub id: String,
    pub provider: &'static str,
    pub cursor_key: String,
    pub interval_secs: u64,
    /// `(env var, present)` for every credential the source needs.
    pub credentials: Vec<(String, bool)>,
    pub stored: Option<ItemKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckReport {
    pub sources: Vec<SourceCheck>,
    pub orphaned: Vec<(String, ItemKey)>,
    pub problems: usize,
}

pub(crate) fn build_report(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
    stored: &[(String, ItemKey)],
) -> CheckReport {
    let mut remaining: BTreeMap<&str, &ItemKey> =
        stored.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let mut problems = 0;

    let sources = config
        .sources
        .iter()
        .map(|source| {
            let descriptor = config.descriptor(source);
            let cursor_key = descriptor.cursor_key();

            let mut names: Vec<&str> = source.provider.credential_env().into_iter().collect();
            if let TargetConfig::Webhook { url_env, .. } = &source.target {
                names.push(url_env);
            }
            let credentials: Vec<(String, bool)> = names
                .into_iter()
                .map(|name| (name.to_string(), env(name).is_some()))
                .collect();
            problems += credentials.iter().filter(|(_, present)| !present).count();

            SourceCheck {
                id: source.id.clone(),
                provider: source.provider.kind(),
                stored: remaining.remove(cursor_key.as_str()).cloned(),
                cursor_key,
                interval_secs: descriptor.interval.as_secs(),
                credentials,
            }
        })
        .collect();

    CheckReport {
        sources,
        orphaned: remaining
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        problems,
    }
}

impl CheckReport {
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for source in &self.sources {
            out.push_str(&format!(
                "{} ({}, every {}s)\n",
                source.id, source.provider, source.interval_secs
            ));
            out.push_str(&format!("  cursor key: {}\n", source.cursor_key));
            out.push_str(&format!(
                "  stored cursor: {}\n",
                display_cursor(source.stored.as_ref())
            ));
            for (name, present) in &source.credentials {
                let state = if *present { "set" } else { "MISSING" };
                out.push_str(&format!("  ${name}: {state}\n"));
            }
        }
        if !self.orphaned.is_empty() {
            out.push_str("unused cursors:\n");
            for (key, cursor) in &self.orphaned {
                out.push_str(&format!("  {key} = {cursor}\n"));
            }
        }
        out
    }
}
