mod crawl;
mod inspect;
mod logging;
mod schedule;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use prcat_scraper::RunControl;

/// Every day at 03:00 UTC (seconds-first cron syntax).
const DEFAULT_CRON: &str = "0 0 3 * * *";

#[derive(Debug, Parser)]
#[command(name = "prcat")]
#[command(about = "Incremental product catalog crawler")]
struct Cli {
    /// Path to the YAML crawl configuration.
    #[arg(long, global = true, env = "PRCAT_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one crawl over the listing.
    Crawl {
        /// Override `parser.parsing.max_pages` (0 means the safety cap).
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Run a crawl on every cron tick until interrupted.
    Schedule {
        #[arg(long, default_value = DEFAULT_CRON)]
        cron: String,
    },
    /// Print the ids already held by the configured storage.
    Ids,
    /// Extract one product from a saved detail page and print it as JSON.
    Inspect {
        #[arg(long)]
        file: PathBuf,
        /// Detail-page URL the file was saved from; supplies the product id.
        #[arg(long)]
        url: Option<String>,
    },
    /// Apply pending Postgres migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = prcat_core::load_config(&cli.config)?;
    logging::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Crawl { max_pages } => {
            if let Some(max_pages) = max_pages {
                config.parser.parsing.max_pages = max_pages;
            }
            let control = RunControl::new();
            crawl::stop_on_ctrl_c(control.clone());
            let outcome = crawl::run_crawl(&config, &control).await?;
            println!(
                "crawled {} pages, {} new products (stopped: {:?})",
                outcome.pages_processed,
                outcome.products.len(),
                outcome.stop_reason
            );
        }
        Commands::Schedule { cron } => schedule::run_schedule(config, &cron).await?,
        Commands::Ids => {
            let sink = prcat_db::open_sink(&config).await?;
            for id in sink.existing_ids().await? {
                println!("{id}");
            }
            sink.close().await?;
        }
        Commands::Inspect { file, url } => {
            let product = inspect::inspect_file(&config, &file, url.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }
        Commands::Migrate => {
            let database = &config.storage.database;
            let pool = prcat_db::connect_pool(
                &database.connection_url(),
                prcat_db::PoolConfig::from(database),
            )
            .await?;
            let applied = prcat_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
            pool.close().await;
        }
    }

    Ok(())
}
