use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cache;
mod cli;
mod config;
mod downloader;
mod errors;
mod fetcher;
mod models;
mod pipeline;
mod plate;
mod search;

use cli::{parse_cache_kind, CacheAction, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Set default log level to INFO if not specified
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "cninfo_dl=info");
    }

    // Initialize logging to both console and file
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let file_appender = tracing_appender::rolling::never(".", "cninfo-dl.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = config::Config::from_env()?;
    if let Some(output) = &cli.output {
        config.download_dir = output.into();
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.into();
    }
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = catalog.into();
    }

    match &cli.command {
        Some(Commands::Cache { action }) => {
            let store = cache::CacheStore::new(&config.cache_dir);
            match action {
                CacheAction::Info => {
                    let info = store.info();
                    println!("Cache directory: {}", config.cache_dir.display());
                    println!("  stock search entries: {}", info.search_count);
                    println!("  stock page entries:   {}", info.stock_count);
                    println!("  listing entries:      {}", info.announcement_count);
                }
                CacheAction::Clear { kind } => {
                    let kind = kind.as_deref().map(parse_cache_kind).transpose()?;
                    store.clear(kind)?;
                    println!("Cache cleared");
                }
            }
        }
        None => {
            let inputs = cli.run_inputs()?;
            let match_mode = if cli.exact {
                config::MatchMode::Exact
            } else {
                config::MatchMode::Fuzzy
            };

            let opts = pipeline::RunOptions {
                stock_code: inputs.stock_code,
                category_filter: inputs.category,
                match_mode,
                incremental: inputs.incremental,
            };

            let summary = pipeline::run(&config, &opts).await?;
            info!(
                "Done: {}/{} announcements downloaded",
                summary.downloaded, summary.attempted
            );
        }
    }

    Ok(())
}
