use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use shopwatch::config::AppConfig;
use shopwatch::connectors::{AuthPayload, ConnectorRegistry};
use shopwatch::extractor::{PageExtractor, PriceExtractor};
use shopwatch::models::Platform;
use shopwatch::orchestrator::{CancelToken, SyncOrchestrator};
use shopwatch::reconciliation::ReconciliationWriter;
use shopwatch::scheduler::SyncScheduler;
use shopwatch::storage::{SqliteStorage, Storage};
use shopwatch::token_manager::TokenManager;

#[derive(Parser)]
#[command(name = "shopwatch", about = "Competitor price tracking and store synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every connected store once
    SyncAll,
    /// Sync a single store by id
    SyncStore { store_id: String },
    /// Scrape all URL-based competitor links, optionally for one product
    Scrape {
        #[arg(long)]
        product: Option<String>,
    },
    /// Complete an Etsy OAuth authorization with the redirect code
    ConnectEtsy { owner_id: String, code: String },
    /// Connect a WooCommerce site with a consumer key/secret pair
    ConnectWoocommerce {
        owner_id: String,
        site_url: String,
        consumer_key: String,
        consumer_secret: String,
    },
    /// Run the periodic sync scheduler until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shopwatch=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let storage = Arc::new(
        SqliteStorage::connect(&config.database.url, config.database.max_connections).await?,
    );
    let writer = ReconciliationWriter::new(storage.clone());
    let connectors = ConnectorRegistry::from_config(&config)?;
    let token_manager = Arc::new(TokenManager::new(
        storage.clone(),
        connectors.clone(),
        writer.clone(),
        config.sync.refresh_margin_secs,
    ));
    let extractor: Arc<dyn PageExtractor> =
        Arc::new(PriceExtractor::new(config.extractor.clone())?);

    let orchestrator = SyncOrchestrator::new(
        storage.clone(),
        writer,
        token_manager.clone(),
        connectors,
        extractor,
        config.sync.clone(),
    );

    match cli.command {
        Commands::SyncAll => {
            let run = orchestrator.sync_all(&CancelToken::new()).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Commands::SyncStore { store_id } => {
            let store = storage
                .get_store(&store_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no store with id {}", store_id))?;
            let outcome = orchestrator.sync_store(&store, &CancelToken::new()).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Scrape { product } => {
            let run = orchestrator
                .scrape_all(product.as_deref(), &CancelToken::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Commands::ConnectEtsy { owner_id, code } => {
            let store = token_manager
                .complete_authorization(&owner_id, Platform::Etsy, AuthPayload::OAuthCode { code })
                .await?;
            println!("{}", serde_json::to_string_pretty(&store)?);
        }
        Commands::ConnectWoocommerce { owner_id, site_url, consumer_key, consumer_secret } => {
            let store = token_manager
                .complete_authorization(
                    &owner_id,
                    Platform::WooCommerce,
                    AuthPayload::ApiKey { site_url, consumer_key, consumer_secret },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&store)?);
        }
        Commands::Schedule => {
            let mut scheduler = SyncScheduler::new(orchestrator, config.scheduler.clone()).await?;
            scheduler.start().await?;

            info!("Scheduler running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}
