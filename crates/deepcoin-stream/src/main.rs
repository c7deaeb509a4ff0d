/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running Deepcoin stream with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deepcoin_stream::{StreamConfig, StreamRunner};

#[derive(Parser, Debug)]
#[command(name = "deepcoin-stream", version, about = "Deepcoin realtime stream subscriber")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting deepcoin-stream"
    );

    let config = load_config(&args.config_path)?;
    info!(
        endpoint = ?config.endpoint,
        subscription_count = config.subscriptions.len(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let runner = StreamRunner::connect(config)
        .await
        .context("build stream runner")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    runner.run(shutdown).await.context("run stream")?;
    info!("shutdown complete");

    Ok(())
}

/// RUST_LOG wins over `--log-level` so a single target can be raised
/// without touching the CLI.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level `{log_level}`"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing already initialized: {err}"))
}

fn load_config(path: &Path) -> Result<StreamConfig> {
    let path = path
        .to_str()
        .with_context(|| format!("config path {} is not utf-8", path.display()))?;
    StreamConfig::from_file(path).with_context(|| format!("load config from {path}"))
}

/// Cancel `shutdown` on the first of SIGINT or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!(signal = "SIGINT", "shutdown requested"),
        _ = terminate => info!(signal = "SIGTERM", "shutdown requested"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_names_missing_path() {
        let err = load_config(Path::new("/nonexistent/stream.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/stream.yaml"));
    }

    #[tokio::test]
    async fn test_signal_watcher_exits_once_shutdown_is_cancelled() {
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_signal(shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), watcher)
            .await
            .expect("watcher should exit")
            .unwrap();
    }
}
