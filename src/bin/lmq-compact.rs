//! lmq-compact – folds historical journal segments into a minimal set.
//
//  $ lmq-compact --config lmq.toml
//
// The newest segment is never touched, so this may run next to a live
// daemon sharing the directory.
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use lmq::logging::init_logging;
use lmq::{Compactor, Config};

#[derive(Debug, Parser)]
#[command(name = "lmq-compact", version, about = "Compact an LMQ recovery directory")]
struct Cli {
    /// Path to config TOML (falls back to env LMQ_CONFIG, then lmq.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Recovery directory; overrides `recovery.dir`
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(config.server.debug)?;

    let dir = cli.dir.unwrap_or_else(|| config.recovery.dir.clone());
    let report = Compactor::new(dir.clone(), config.recovery.file_size)
        .run()
        .with_context(|| format!("failed to compact {dir:?}"))?;

    info!(
        "read {} segments ({} records, {} malformed, {} unreadable), wrote {} segments ({} records)",
        report.segments_read,
        report.records_read,
        report.malformed_lines,
        report.segments_skipped,
        report.segments_written,
        report.records_written
    );
    Ok(())
}
