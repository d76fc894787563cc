//! Per-source lifecycle and the status record served to operators.
//!
//! States: `Idle → Running → (Idle | Disabled)`. `Disabled` is terminal;
//! leaving it takes a process restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::ItemKey;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    #[default]
    Idle,
    Running,
    Disabled,
}

impl SourceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Disabled => "disabled",
        }
    }
}

/// Operator-facing snapshot of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub provider: String,
    pub state: SourceState,
    /// Cursor after the last completed cycle, as far as this process knows.
    pub cursor: Option<ItemKey>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Short description of the last cycle (`baseline`, `delivered 2`, ...).
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub consecutive_failures: u32,
    /// Ticks dropped by backoff since the last cycle ran.
    pub suppressed_ticks: u32,
    pub delivered_total: u64,
    pub disabled_reason: Option<String>,
}

impl SourceStatus {
    pub fn new(source_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            provider: provider.into(),
            state: SourceState::Idle,
            cursor: None,
            last_cycle_at: None,
            last_outcome: None,
            last_error: None,
            last_error_kind: None,
            consecutive_failures: 0,
            suppressed_ticks: 0,
            delivered_total: 0,
            disabled_reason: None,
        }
    }

    /// Enter `Running`. Returns `false` (and changes nothing) when disabled
    /// or already running.
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SourceState::Idle {
            return false;
        }
        self.state = SourceState::Running;
        self.last_cycle_at = Some(now);
        self.suppressed_ticks = 0;
        true
    }

    /// Cycle completed without error.
    pub fn finish_success(
        &mut self,
        outcome: impl Into<String>,
        cursor: Option<ItemKey>,
        delivered: usize,
    ) {
        if self.state == SourceState::Disabled {
            return;
        }
        self.state = SourceState::Idle;
        self.last_outcome = Some(outcome.into());
        self.last_error = None;
        self.last_error_kind = None;
        self.consecutive_failures = 0;
        self.delivered_total += delivered as u64;
        if cursor.is_some() {
            self.cursor = cursor;
        }
    }

    /// Cycle failed with a retryable error. Progress confirmed before the
    /// failure (if any) is still recorded.
    pub fn finish_failure(
        &mut self,
        kind: ErrorKind,
        error: impl Into<String>,
        cursor: Option<ItemKey>,
        delivered: usize,
        consecutive_failures: u32,
    ) {
        if self.state == SourceState::Disabled {
            return;
        }
        self.state = SourceState::Idle;
        self.last_outcome = Some("failed".to_string());
        self.last_error = Some(error.into());
        self.last_error_kind = Some(kind);
        self.consecutive_failures = consecutive_failures;
        self.delivered_total += delivered as u64;
        if cursor.is_some() {
            self.cursor = cursor;
        }
    }

    /// Terminal transition.
    pub fn disable(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state = SourceState::Disabled;
        self.last_error = Some(reason.clone());
        self.last_error_kind = Some(ErrorKind::Permanent);
        self.disabled_reason = Some(reason);
    }

    pub fn note_suppressed_tick(&mut self) {
        self.suppressed_ticks = self.suppressed_ticks.saturating_add(1);
    }

    pub fn is_disabled(&self) -> bool {
        self.state == SourceState::Disabled
    }
}
