#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

mod background;
mod config;
mod errors;
mod fsutil;
mod host;
mod keys;
mod network;
mod paths;
mod popup;
mod queue;
mod session;
mod storage;
mod store;
mod transaction;
mod vault;
mod whitelist;

#[derive(Parser, Debug)]
#[command(name = "keyward", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the wallet background over stdio (newline-delimited JSON frames).
    ///
    /// stdout carries only protocol frames; logs go to stderr and the log file.
    Serve,

    /// Print resolved paths (useful for debugging).
    Paths,
}

fn init_logging(paths: &paths::KeywardPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("keyward.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

async fn serve(paths: &paths::KeywardPaths) -> eyre::Result<()> {
    let cfg = store::ConfigStore::new(paths).load_or_init_default()?;
    let storage = Arc::new(storage::FileStorage::open(paths)?);
    let network = Arc::new(network::HorizonClient::new(
        &cfg.network,
        cfg.request_timeout(),
    )?);
    let (sink, frames) = host::frame_channel();

    info!(
        horizon = %cfg.network.horizon_url,
        session_seconds = cfg.session_seconds,
        "keyward serving on stdio"
    );
    let bg = background::Background::new(storage, network, Arc::new(sink.clone()), cfg);
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    host::serve(
        bg,
        sink,
        frames,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown,
    )
    .await
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::KeywardPaths::discover()?;
    paths.ensure_private_dirs()?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Serve => serve(&paths).await.context("serve failed"),
        Command::Paths => {
            use std::io::Write as _;
            let s = serde_json::to_string(&serde_json::json!({
              "config_dir": paths.config_dir,
              "data_dir": paths.data_dir,
              "log_file": paths.log_file,
              "config_file": paths.config_file(),
              "storage_file": paths.storage_file(),
            }))
            .context("serialize paths")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write paths")?;
            Ok(())
        }
    }
}
