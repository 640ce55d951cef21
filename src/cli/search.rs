use anyhow::Result;
use clap::Args;

use crate::app::Services;

#[derive(Args)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Search the images collection instead of documents
    #[arg(long)]
    pub images: bool,

    /// Maximum number of results
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}

pub async fn run(args: SearchArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let services = Services::build(&config)?;
    let collection = super::collection_flag(args.images);

    let results = services
        .store(collection)
        .search(&args.query, args.limit)
        .await?;

    if results.is_empty() {
        println!("No results found for '{}' in {}", args.query, collection);
        return Ok(());
    }

    println!(
        "Found {} results for '{}' in {}:\n",
        results.len(),
        args.query,
        collection
    );

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. {} (lines {}-{})",
            i + 1,
            result.source,
            result.line_start,
            result.line_end
        );
        println!("   Score: {:.3}", result.score);

        let preview: String = result.content.chars().take(200).collect();
        let preview = preview.replace('\n', " ");
        println!(
            "   {}{}\n",
            preview,
            if result.content.chars().count() > 200 {
                "..."
            } else {
                ""
            }
        );
    }

    Ok(())
}
