mod db;
mod error;
mod fetch;
mod ingest;
mod parser;
mod settings;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::Url;
use tracing::{debug, info};

use db::Store;
use fetch::HttpFetcher;
use ingest::Ingestion;
use settings::Settings;

#[derive(Parser)]
#[command(name = "books_scraper", about = "Book catalogue scraper (books.toscrape.com layout)")]
struct Cli {
    /// SQLite database file (default: DATABASE_PATH or data/books.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the categories and books tables
    Init,
    /// Crawl categories, then every category's books, into the database
    Run {
        /// Catalogue root page (default: URL_TO_SCRAPE)
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Show stored category and book counts
    Stats {
        /// Also list the book count of every category
        #[arg(long)]
        by_category: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to read settings from environment")?;
    let db_path = cli.db.unwrap_or_else(|| settings.database_path.clone());

    match cli.command {
        Commands::Init => {
            let store = open_store(&db_path)?;
            store.close()?;
            println!("Schema ready in {}", db_path.display());
        }
        Commands::Run { url } => {
            let Some(root) = url.or(settings.url_to_scrape) else {
                bail!("No root URL: pass --url or set URL_TO_SCRAPE");
            };
            let root = Url::parse(&root).with_context(|| format!("Invalid root URL {:?}", root))?;
            let fetcher = HttpFetcher::new(Duration::from_secs(settings.request_timeout_secs))
                .context("Failed to build HTTP client")?;

            let store = open_store(&db_path)?;
            info!("Starting ingestion from {} into {}", root, db_path.display());
            let mut ingestion = Ingestion::new(&store, &fetcher, root);
            let result = ingestion.run().await;
            debug!(
                "Run ended in state {:?} after {} pages",
                ingestion.state(),
                ingestion.report().pages_fetched
            );
            drop(ingestion);
            match result {
                Ok(report) => {
                    store.close()?;
                    report.print();
                }
                Err(e) => {
                    let kind = e.kind();
                    // Committed batches stay; the close error is secondary here.
                    let _ = store.close();
                    return Err(anyhow::Error::new(e).context(format!("Ingestion failed ({})", kind)));
                }
            }
        }
        Commands::Stats { by_category } => {
            let store = open_store(&db_path)?;
            let s = store.stats()?;
            println!("Categories: {}", s.categories);
            println!("Books:      {}", s.books);
            if s.orphan_books > 0 {
                println!("Orphans:    {} books reference a missing category", s.orphan_books);
            }
            if by_category {
                println!();
                for category in store.list_categories()? {
                    let books = store.books_in_category(category.id)?;
                    println!("{:>4}  {}", books.len(), category.name);
                }
            }
            store.close()?;
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    Ok(())
}

fn open_store(path: &Path) -> anyhow::Result<Store> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let store = Store::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    store.init_schema()?;
    Ok(store)
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
