//! feedwatch: incremental external-feed poller.
//!
//! One process runs a task per configured source. Each task polls its feed,
//! forwards items newer than its stored cursor to a sink, and persists the
//! cursor so a restart never re-notifies. A UDS socket serves status.

use clap::Parser;

mod cli;
mod client;
mod cmd_check;
mod cmd_status;
mod config;
mod daemon;
mod server;
mod sinks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("FEEDWATCH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!(config = %opts.config.display(), "feedwatch daemon starting");
            daemon::run_daemon(&opts.config, &socket_path).await?;
        }
        cli::Command::Status(opts) => {
            cmd_status::cmd_status(&socket_path, opts.json, opts.source.as_deref()).await?;
        }
        cli::Command::Check(opts) => {
            cmd_check::cmd_check(&opts.config)?;
        }
    }

    Ok(())
}
