use anyhow::Result;
use clap::Args;

use crate::app::{Services, llm_provider};

#[derive(Args)]
pub struct AskArgs {
    /// The question (or keywords, with --images)
    pub question: String,

    /// Ask which image file matches the keywords
    #[arg(long)]
    pub images: bool,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: AskArgs, config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let services = Services::build(&config)?;
    let collection = super::collection_flag(args.images);

    let client = services.query_client(collection, llm_provider(&config)?);
    let answer = client.query(&args.question).await?;

    match args.format.as_str() {
        "json" => {
            let output = serde_json::json!({
                "question": args.question,
                "collection": collection,
                "answer": answer.answer,
                "sources": answer.sources,
                "model": config.query.model,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in &answer.sources {
                    println!("  {}", source);
                }
            }
        }
    }

    Ok(())
}
