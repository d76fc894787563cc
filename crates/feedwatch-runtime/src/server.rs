//! UDS JSON-RPC status server.
//! Connection-per-request, newline-delimited JSON, read-only.

use std::path::Path;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use feedwatch_core::SourceState;
use feedwatch_engine::StatusBoard;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const PARSE_ERROR: i64 = -32700;

/// Prepare the socket directory and bind the listener.
///
/// Refuses to start when another daemon answers on `socket_path`; a socket
/// file nobody answers on is removed.
pub async fn bind(socket_path: &str) -> anyhow::Result<UnixListener> {
    let socket_dir = Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path {socket_path}"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("status socket listening on {socket_path}");
    Ok(listener)
}

/// Accept connections until `shutdown` fires.
pub async fn run_server(
    listener: UnixListener,
    board: StatusBoard,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?.0,
        };
        let board = board.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &board).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, board: &StatusBoard) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<Value>(line.trim()) {
        Ok(request) => dispatch(board, &request),
        Err(e) => error_response(Value::Null, PARSE_ERROR, &format!("parse error: {e}")),
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;
    Ok(())
}

/// Answer one request against the current board.
pub(crate) fn dispatch(board: &StatusBoard, request: &Value) -> Value {
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let result = match method {
        "list_sources" => json!(board.snapshot()),
        "get_source" => {
            let Some(source_id) = request["params"]["id"].as_str() else {
                return error_response(id, INVALID_PARAMS, "missing params.id");
            };
            match board.get(source_id) {
                Some(status) => json!(status),
                None => {
                    return error_response(
                        id,
                        INVALID_PARAMS,
                        &format!("unknown source {source_id}"),
                    );
                }
            }
        }
        "summary" => build_summary(board),
        _ => return error_response(id, METHOD_NOT_FOUND, "method not found"),
    };

    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn build_summary(board: &StatusBoard) -> Value {
    let statuses = board.snapshot();
    let count = |state: SourceState| statuses.iter().filter(|s| s.state == state).count();
    json!({
        "sources": statuses.len(),
        "idle": count(SourceState::Idle),
        "running": count(SourceState::Running),
        "disabled": count(SourceState::Disabled),
        "failing": statuses.iter().filter(|s| s.consecutive_failures > 0).count(),
        "delivered_total": statuses.iter().map(|s| s.delivered_total).sum::<u64>(),
    })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}
