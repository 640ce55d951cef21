use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docwatch::cli::{self, Cli, Commands, LogFormat};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging(&cli);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Watch(args) => cli::watch::run(args, config_path).await,
        Commands::Reindex(args) => cli::reindex::run(args, config_path).await,
        Commands::Search(args) => cli::search::run(args, config_path).await,
        Commands::Ask(args) => cli::ask::run(args, config_path).await,
        Commands::Stats => cli::stats::run(config_path).await,
        Commands::Config(args) => cli::config::run(args, config_path),
        Commands::Paths => cli::paths::run(),
    }
}

/// `RUST_LOG` wins, then `--verbose`, then `logging.level` from config.
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cli::configured_log_level(cli.config.as_deref()).unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr; stdout carries command output
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
