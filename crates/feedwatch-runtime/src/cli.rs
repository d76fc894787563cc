//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "feedwatch", about = "incremental external-feed poller", version)]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/feedwatch/feedwatch.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the poller (source tasks + status socket)
    Daemon(ConfigOpts),
    /// Show per-source status from a running daemon
    Status(StatusOpts),
    /// Validate a config file and show stored cursors
    Check(ConfigOpts),
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    /// Config file
    #[arg(long, short = 'c', env = "FEEDWATCH_CONFIG", default_value = "feedwatch.toml")]
    pub config: PathBuf,
}

#[derive(clap::Args)]
pub struct StatusOpts {
    /// Print the raw status records as JSON
    #[arg(long)]
    pub json: bool,

    /// Show a single source
    #[arg(long)]
    pub source: Option<String>,
}

/// Default socket path, isolated per user.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR")
        && !dir.is_empty()
    {
        return format!("{dir}/feedwatch/feedwatch.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/feedwatch-{user}/feedwatch.sock")
}
