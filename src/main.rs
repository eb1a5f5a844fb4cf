//! iEndorse endorsement period tracker

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iendorse_tracker::{
    config::Args,
    db::{schemas::ENDORSEMENT_HISTORY_COLLECTION, MongoClient},
    server::{self, AppState},
    tracker::{EndorsementTracker, HistoryStore, MemoryHistoryStore, MongoHistoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("iendorse_tracker={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  iEndorse - Endorsement Tracker");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Build the history store over MongoDB, or in memory in dev mode
    let store: Arc<dyn HistoryStore> = match &mongo {
        Some(client) => {
            let collection = client.collection(ENDORSEMENT_HISTORY_COLLECTION).await?;
            Arc::new(MongoHistoryStore::new(collection))
        }
        None => Arc::new(MemoryHistoryStore::new()),
    };

    let tracker = Arc::new(EndorsementTracker::new(store));
    let state = Arc::new(AppState::new(args, mongo, tracker));

    server::run(state).await?;
    Ok(())
}
