use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::app::Services;

#[derive(Args)]
pub struct ReindexArgs {
    /// Directory to index (overrides watch.root)
    #[arg(short, long)]
    pub root: Option<PathBuf>,
}

pub async fn run(args: ReindexArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let services = Services::build(&config)?;

    println!("Reindexing...");
    let stats = services.reindex(args.root.as_deref()).await?;

    println!("Reindex complete:");
    println!("  Files seen: {}", stats.files_seen);
    println!("  Indexed: {}", stats.indexed);
    println!("  Unsupported: {}", stats.unsupported);
    println!("  Removed: {}", stats.removed);
    if stats.failed > 0 {
        println!("  Failed: {} (see log)", stats.failed);
    }
    println!("  Duration: {:?}", stats.duration);

    Ok(())
}
