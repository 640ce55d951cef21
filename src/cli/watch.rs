use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::app::Services;

#[derive(Args)]
pub struct WatchArgs {
    /// Directory to watch (overrides watch.root)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Reindex the whole tree before watching
    #[arg(long)]
    pub initial_scan: bool,
}

pub async fn run(args: WatchArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let services = Services::build(&config)?;

    if args.initial_scan {
        let stats = services.reindex(args.root.as_deref()).await?;
        println!(
            "Initial scan: {} files, {} indexed, {} removed",
            stats.files_seen, stats.indexed, stats.removed
        );
    }

    let pipeline = services.start_pipeline(args.root.as_deref())?;
    let timing = services.timing()?;
    println!(
        "Watching {} (debounce {:?}, scan every {:?}). Press Ctrl-C to stop.",
        pipeline.root().display(),
        timing.debounce,
        timing.scan_interval
    );

    tokio::signal::ctrl_c().await?;
    info!(
        "Shutting down with {} events pending",
        pipeline.pending_events()
    );
    pipeline.shutdown().await?;
    println!("Stopped.");
    Ok(())
}
