//! tapevault - offline concert-archive metadata sync
//!
//! Wires the pipeline components together and runs the requested command,
//! printing progress from the orchestrator's broadcast stream.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use tapevault::cli::{CliOptions, Command, usage};
use tapevault::config::Config;
use tapevault::db::Database;
use tapevault::services::{
    ArchiveExtractor, CommandZipEngine, Downloader, EntityImporter, RemoteFileLocator,
    SyncOrchestrator, SyncProgress,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "tapevault=info".into()),
        )
        .init();

    let options = CliOptions::from_args();
    let Some(command) = options.command else {
        eprintln!("{}", usage());
        std::process::exit(2);
    };

    let mut config = Config::from_env()?;
    if let Some(path) = options.database_path {
        config.database_path = path;
    }
    if let Some(dir) = options.data_dir {
        config.data_dir = dir;
    }

    let db = Database::connect(&config.database_path).await?;

    let orchestrator = SyncOrchestrator::new(
        db.clone(),
        RemoteFileLocator::new(config.releases_base_url.clone()),
        Downloader::new(),
        ArchiveExtractor::new(Box::new(CommandZipEngine)),
        EntityImporter::new(db.clone()),
        config.data_dir.clone(),
    );

    // Drain progress into log lines while a command runs
    let mut progress = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            match event {
                SyncProgress::Downloading { bytes, total } => {
                    tracing::info!(bytes, total, "downloading");
                }
                SyncProgress::Extracting { current, total } => {
                    tracing::info!(current, total, "extracting");
                }
                SyncProgress::ImportingShows { current, total } => {
                    if current % 500 == 0 || current == total {
                        tracing::info!(current, total, "importing shows");
                    }
                }
                SyncProgress::ImportingRecordings { current, total } => {
                    if current % 500 == 0 || current == total {
                        tracing::info!(current, total, "importing recordings");
                    }
                }
                SyncProgress::Clearing => tracing::info!("clearing"),
                SyncProgress::Idle => {}
            }
        }
    });

    let result = match command {
        Command::Sync => orchestrator.sync_data().await,
        Command::Refresh => orchestrator.force_refresh_data().await,
        Command::Clear => orchestrator.clear_all_data().await,
        Command::Show(query) => {
            print_shows(&db, &query).await?;
            drop(orchestrator);
            printer.abort();
            return Ok(());
        }
    };

    drop(orchestrator);
    printer.abort();

    match result {
        Ok(outcome) => {
            println!("{outcome:?}");
            Ok(())
        }
        Err(e) => {
            eprintln!("sync failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn print_shows(db: &Database, query: &str) -> Result<()> {
    let shows = db.shows().await.search(query, 25).await?;
    if shows.is_empty() {
        println!("no shows match '{query}'");
        return Ok(());
    }

    let recordings = db.recordings().await;
    for show in shows {
        println!(
            "{}  {} - {} ({})",
            show.date, show.band, show.venue, show.location_raw
        );
        for recording in recordings.list_for_show(&show.id).await? {
            println!(
                "    {}  [{}] rating {:.2}",
                recording.identifier, recording.source_type, recording.rating
            );
        }
    }
    Ok(())
}
