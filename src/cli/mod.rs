pub mod ask;
pub mod config;
pub mod paths;
pub mod reindex;
pub mod search;
pub mod stats;
pub mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::index::Collection;
use crate::paths::Paths;

#[derive(Parser)]
#[command(name = "docwatch")]
#[command(
    author,
    version,
    about = "Watch a directory tree and keep a searchable index of its files"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file instead of the default
    #[arg(short, long, global = true, env = "DOCWATCH_CONFIG")]
    pub config: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the tree and index changes until interrupted
    Watch(watch::WatchArgs),

    /// Index every file under the tree and drop entries for deleted files
    Reindex(reindex::ReindexArgs),

    /// Search the index
    Search(search::SearchArgs),

    /// Ask a question answered from the index
    Ask(ask::AskArgs),

    /// Show index statistics
    Stats,

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}

/// Load `path` if given, otherwise the default config (created on first run).
pub fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            let expanded = shellexpand::tilde(path).to_string();
            Config::load_from(Path::new(&expanded), Paths::resolve()?)
        }
        None => Config::load(),
    }
}

/// `logging.level` from an existing config file, without creating one.
/// Errors are ignored here; they surface when the command loads the config.
pub fn configured_log_level(path: Option<&str>) -> Option<String> {
    let paths = Paths::resolve().ok()?;
    let file = match path {
        Some(path) => PathBuf::from(shellexpand::tilde(path).to_string()),
        None => paths.config_file(),
    };
    if !file.exists() {
        return None;
    }
    Config::load_from(&file, paths)
        .ok()
        .map(|config| config.logging.level)
}

pub(crate) fn collection_flag(images: bool) -> Collection {
    if images {
        Collection::Images
    } else {
        Collection::Documents
    }
}
