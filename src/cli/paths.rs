//! CLI subcommand: `docwatch paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use anyhow::Result;

use crate::paths::Paths;

pub fn run() -> Result<()> {
    let paths = Paths::resolve()?;

    println!("docwatch Paths (XDG Base Directory)");
    println!("===================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", paths.config_file().display());
    println!();
    println!("Data:       {}", paths.data_dir.display());
    println!("  index:          {}", paths.index_db().display());
    println!();
    println!("Cache:      {}", paths.cache_dir.display());
    println!(
        "  models:         {}",
        paths.embedding_cache_dir().display()
    );

    Ok(())
}
