use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradeledger::application::services::ledger_service::LedgerService;
use tradeledger::auth::TokenIssuer;
use tradeledger::config::ServerConfig;
use tradeledger::domain::repositories::ledger_store::LedgerStore;
use tradeledger::domain::services::read_through::ReadThrough;
use tradeledger::domain::services::settlement::SettlementWorker;
use tradeledger::infrastructure::memory_cache::MemoryCache;
use tradeledger::persistence::init_database;
use tradeledger::persistence::repository::SqliteLedgerStore;
use tradeledger::server::{build_router, RouterLimits};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradeledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!("Starting trade ledger with {:?}", config);

    let pool = init_database(&config.database).await?;
    let store: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(pool));

    let cache = ReadThrough::new(
        Arc::new(MemoryCache::new(config.cache_capacity)),
        config.cache_ttl,
    );
    let tokens = Arc::new(TokenIssuer::new(
        config.jwt_secret.as_bytes().to_vec(),
        config.token_ttl,
    )?);
    let settlements = Arc::new(
        SettlementWorker::new(store.clone(), config.settlement_delay).with_cache(cache.clone()),
    );
    settlements.recover_interrupted().await?;

    let service = Arc::new(LedgerService::new(
        store,
        cache,
        tokens.clone(),
        settlements.clone(),
        config.password_hash_cost,
    ));

    let app = build_router(service, tokens, RouterLimits::from(&config));

    info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    let served = server.with_graceful_shutdown(shutdown_signal).await;

    // Requests have stopped; let accepted settlements finish
    settlements.shutdown().await;
    served?;

    info!("Shutdown complete");
    Ok(())
}
