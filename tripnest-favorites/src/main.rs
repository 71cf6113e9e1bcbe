//! tripnest-favorites - favorites client harness
//!
//! Drives the favorites subsystem against a real backend: hydrates from the
//! local database and the server, then lists, toggles or clears favorites.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tripnest_common::config::{ClientConfig, ConfigOverrides};
use tripnest_common::events::EventBus;
use tripnest_common::ItemType;
use tripnest_favorites::persistence::SqlitePersistence;
use tripnest_favorites::remote::{HttpRemoteFavorites, StaticToken};
use tripnest_favorites::{EntityRef, FavoritesService, ToggleOutcome};

#[derive(Parser, Debug)]
#[command(name = "tripnest-favorites", version, about = "TripNest favorites client")]
struct Cli {
    /// Backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Folder holding the local favorites database
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Explicit config file (default: ~/.config/tripnest/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(long)]
    log_level: Option<String>,

    /// Bearer token for the favorites endpoints
    #[arg(long, env = "TRIPNEST_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print current favorites
    List {
        #[arg(long = "type")]
        item_type: Option<ItemType>,
    },
    /// Toggle one favorite and wait for the server
    Toggle {
        #[arg(long = "type")]
        item_type: ItemType,
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Hydrate and report reconciliation
    Sync,
    /// Drop all local favorites
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ClientConfig::resolve(ConfigOverrides {
        api_base_url: cli.api_url.clone(),
        data_folder: cli.data_folder.clone(),
        log_level: cli.log_level.clone(),
        config_file: cli.config.clone(),
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "Starting tripnest-favorites v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.api_base_url
    );

    config.ensure_data_folder()?;
    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = tripnest_common::db::init_database(&db_path).await?;

    let remote = HttpRemoteFavorites::new(
        config.api_base_url.clone(),
        Duration::from_millis(config.request_timeout_ms),
        Arc::new(StaticToken(cli.token.clone())),
    )
    .context("Failed to build HTTP client")?;

    let service = FavoritesService::new(
        Arc::new(remote),
        Arc::new(SqlitePersistence::new(pool)),
        Arc::new(EventBus::new(config.event_capacity)),
    );

    match cli.command {
        Command::Clear => {
            service.teardown().await;
            println!("Cleared local favorites");
            return Ok(());
        }
        Command::Sync => {
            let report = service.hydrate().await;
            println!(
                "restored {}, added {}, removed {}, unresolvable {}, remote {}",
                report.restored,
                report.added,
                report.removed,
                report.unresolvable,
                if report.remote_reconciled { "reconciled" } else { "unavailable" }
            );
            return Ok(());
        }
        _ => {}
    }

    service.hydrate().await;

    match cli.command {
        Command::List { item_type } => {
            for record in service.list_favorites(item_type) {
                println!(
                    "{}\t{}\t{}",
                    record.key,
                    record.payload.title.as_deref().unwrap_or("-"),
                    if record.confirmed_on_server { "confirmed" } else { "pending" }
                );
            }
        }
        Command::Toggle {
            item_type,
            id,
            title,
        } => {
            let mut entity = match item_type {
                ItemType::Festival => EntityRef::new(item_type).with_contentid(id),
                ItemType::Product | ItemType::Spot => EntityRef::new(item_type).with_id(id),
            };
            if let Some(title) = title {
                entity = entity.with_title(title);
            }

            let pending = service.toggle_favorite(&entity)?;
            println!(
                "{} -> {} (optimistic)",
                pending.key(),
                if pending.is_favorite() { "favorite" } else { "not favorite" }
            );

            match pending.outcome().await? {
                ToggleOutcome::Confirmed { key, state, .. } => {
                    println!("{} confirmed: {:?}", key, state);
                }
                ToggleOutcome::Superseded { key, .. } => {
                    println!("{} superseded by a newer change", key);
                }
            }
        }
        Command::Sync | Command::Clear => {}
    }

    Ok(())
}
