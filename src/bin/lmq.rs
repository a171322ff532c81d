//! lmq – the queue daemon.
//
//  $ lmq --config lmq.toml
//  $ curl 127.0.0.1:8080/set/jobs/hello
//  OK.
//  $ curl 127.0.0.1:8080/get/jobs
//  hello
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use lmq::api::{self, AppState, PayloadResolver};
use lmq::logging::init_logging;
use lmq::{Broker, Config};

#[derive(Debug, Parser)]
#[command(name = "lmq", version, about = "LMQ message queue daemon")]
struct Cli {
    /// Path to config TOML (falls back to env LMQ_CONFIG, then lmq.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(config.server.debug)?;

    // Nothing is served until recovery has finished.
    let broker = Broker::open(&config)
        .await
        .with_context(|| format!("failed to recover from {:?}", config.recovery.dir))?;
    let broker = Arc::new(broker);

    let resolver = PayloadResolver::new(&config.payload).context("invalid payload settings")?;
    let state = AppState::new(Arc::clone(&broker), resolver, config.server.whitelist()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                error!("cannot listen for Ctrl-C: {e}");
                futures::future::pending::<()>().await;
            }
        }
    });

    api::serve(state, &config.server.bind_addresses, shutdown_rx)
        .await
        .context("HTTP server failed")?;

    broker.flush().await.context("failed to flush the journal")?;
    info!("journal flushed, exiting");
    Ok(())
}
