use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use addon_compat::config::Config;
use addon_compat::{logging, runner};

#[derive(Parser)]
#[command(name = "addon-compat")]
#[command(version, about = "Crawls the add-on catalog and tracks extension compatibility")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the snapshot, downloads and log file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = logging::DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Ignore the snapshot and process every package again
    #[arg(long)]
    force: bool,

    /// Stop the catalog search after this many pages
    #[arg(long)]
    max_pages: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the supported platform versions and exit
    Versions,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if cli.force {
        config.force_reprocessing = true;
    }
    if let Some(pages) = cli.max_pages {
        config.catalog.max_search_pages = pages;
    }
    Ok(config)
}

async fn execute(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Versions) => {
            let platform = runner::platform_versions(&config).await?;
            println!("{}", serde_json::to_string(&platform.supported)?);
        }
        None => {
            let summary = runner::run(&config).await?;
            tracing::info!(
                "Done: {} packages, {} updated, {} processed, {} removed",
                summary.total,
                summary.sync.updated.len(),
                summary.processed,
                summary.sync.removed.len()
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _guard = logging::init(&cli.log_level, &config.log_path())
        .with_context(|| format!("Failed to set up logging in {:?}", config.data_dir()))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(execute(cli, config))
}
