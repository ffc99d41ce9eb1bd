use bookshelf_sync::{OpenLibraryClient, SyncConfig, SyncManager};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bookshelf-sync")]
#[command(about = "Inspect and drive the offline book cache", long_about = None)]
struct Args {
    /// Base URL of the book service (overrides BOOKSHELF_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Directory holding the local store (overrides BOOKSHELF_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds (overrides BOOKSHELF_TIMEOUT_SECS)
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh the cache from the service, falling back to what is stored
    Refresh,
    /// List books
    List {
        /// Only read the local cache
        #[arg(long)]
        offline: bool,
    },
    /// Replay queued operations against the service
    Flush,
    /// Show queued operations
    Pending,
    /// Reading statistics
    Stats,
    /// Look up the number of editions of a title on Open Library
    Editions { title: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookshelf_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = SyncConfig::from_env();
    if let Some(url) = args.api_url {
        config.base_url = url;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(secs) = args.timeout {
        config.request_timeout_secs = secs;
    }
    tracing::debug!("Using {:?}", config);

    if let Command::Editions { title } = &args.command {
        let client = OpenLibraryClient::new(
            &config.openlibrary_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        match client.edition_count(title).await {
            Some(count) => println!("{}", count),
            None => println!("unknown"),
        }
        return Ok(());
    }

    let sync = SyncManager::from_config(&config)?;

    match args.command {
        Command::Refresh => {
            let books = sync.init_sync().await;
            println!("{} book(s) cached", books.len());
        }
        Command::List { offline } => {
            let books = if offline {
                sync.cached_books().await
            } else {
                sync.get_books().await
            };
            for book in books {
                let marker = if book.is_temporary() { " (unsynced)" } else { "" };
                println!(
                    "{:>8}  {} - {} ({}){}",
                    book.id, book.name, book.author, book.year, marker
                );
            }
        }
        Command::Flush => {
            let result = sync.flush().await;
            println!(
                "pushed {}, remaining {}",
                result.pushed, result.remaining
            );
            for error in &result.errors {
                eprintln!("error: {}", error);
            }
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Pending => {
            let ops = sync.pending_operations().await;
            println!("{}", serde_json::to_string_pretty(&ops)?);
        }
        Command::Stats => {
            let stats = sync.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Editions { .. } => {}
    }

    Ok(())
}
