use anyhow::Result;

use crate::app::Services;
use crate::index::Collection;

pub async fn run(config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let services = Services::build(&config)?;

    let db = config.paths.index_db();
    let size_kb = std::fs::metadata(&db).map(|m| m.len() / 1024).unwrap_or(0);

    println!("Index Statistics");
    println!("----------------");
    println!("Database: {} ({} KB)", db.display(), size_kb);
    println!("Watch root: {}", config.watch_root().display());
    println!(
        "Embeddings: {} ({})",
        config.embedding.provider, config.embedding.model
    );
    println!(
        "Cached embeddings: {}",
        services.store(Collection::Documents).cached_embeddings()?
    );
    println!();

    for stats in services.stats()? {
        println!(
            "{:<10} {} files, {} chunks ({} embedded)",
            stats.collection.as_str(),
            stats.sources,
            stats.chunks,
            stats.embedded_chunks
        );
    }

    Ok(())
}
