//! `feedwatch status`: per-source table (or JSON) from a running daemon.

use chrono::{DateTime, Utc};

use feedwatch_core::{SourceStatus, display_cursor};

use crate::client::rpc_call;

pub async fn cmd_status(socket_path: &str, json: bool, source: Option<&str>) -> anyhow::Result<()> {
    let result = match source {
        Some(id) => {
            let one = rpc_call(socket_path, "get_source", serde_json::json!({"id": id})).await?;
            serde_json::Value::Array(vec![one])
        }
        None => rpc_call(socket_path, "list_sources", serde_json::json!({})).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let statuses: Vec<SourceStatus> = serde_json::from_value(result)?;
    print!("{}", format_table(&statuses, Utc::now()));
    Ok(())
}

const HEADERS: [&str; 8] = [
    "SOURCE",
    "PROVIDER",
    "STATE",
    "CURSOR",
    "LAST-CYCLE",
    "OUTCOME",
    "FAIL",
    "DELIVERED",
];

/// Pure table rendering, separated for testability.
pub(crate) fn format_table(statuses: &[SourceStatus], now: DateTime<Utc>) -> String {
    if statuses.is_empty() {
        return "no sources configured\n".to_string();
    }

    let rows: Vec<[String; 8]> = statuses
        .iter()
        .map(|s| {
            [
                s.source_id.clone(),
                s.provider.clone(),
                s.state.as_str().to_string(),
                display_cursor(s.cursor.as_ref()),
                s.last_cycle_at
                    .map_or_else(|| "-".to_string(), |at| format_age(now, at)),
                s.last_outcome.clone().unwrap_or_else(|| "-".to_string()),
                s.consecutive_failures.to_string(),
                s.delivered_total.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }

    let notes: Vec<String> = statuses
        .iter()
        .filter_map(|s| {
            let note = s.disabled_reason.as_ref().or(s.last_error.as_ref())?;
            let label = if s.disabled_reason.is_some() {
                "disabled"
            } else {
                "last error"
            };
            Some(format!("  {}: {label}: {note}", s.source_id))
        })
        .collect();
    if !notes.is_empty() {
        out.push('\n');
        for note in notes {
            out.push_str(&note);
            out.push('\n');
        }
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 8], widths: &[usize; 8]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Compact relative age: `42s ago`, `5m ago`, `3h ago`, `2d ago`.
pub(crate) fn format_age(now: DateTime<Utc>, at: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..60 => format!("{secs}s ago"),
        60..3600 => format!("{}m ago", secs / 60),
        3600..86400 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}
