//! # sectionkit CLI
//!
//! Renders a theme page and its sections into a static preview.

mod commands;

use anyhow::Context;
use clap::Parser;
use sectionkit_core::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sectionkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root holding templates/, sections/ and the assets
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// YAML file overriding the project layout (paths resolve next to it)
    #[arg(long, conflicts_with = "root")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout only carries the build summary
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading config from {:?}", path);
            Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?
        }
        None => Config::for_root(&cli.root),
    };

    commands::build_site(&config).await?;
    Ok(())
}
