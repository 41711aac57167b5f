use std::sync::Arc;

use shopwatch::config::{
    AppConfig, DatabaseConfig, EtsyConfig, ExtractorConfig, PlatformsConfig, SchedulerConfig,
    SyncConfig,
};
use shopwatch::connectors::ConnectorRegistry;
use shopwatch::extractor::{PageExtractor, PriceExtractor};
use shopwatch::orchestrator::SyncOrchestrator;
use shopwatch::reconciliation::ReconciliationWriter;
use shopwatch::storage::SqliteStorage;
use shopwatch::token_manager::TokenManager;

mod connector_tests;
mod extractor_tests;
mod sync_flow_tests;

/// Configuration pointing every outbound call at the given mock server.
pub fn test_config(etsy_base: &str) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 30,
        },
        extractor: ExtractorConfig {
            user_agent: "ShopWatchTest/0.1".to_string(),
            request_timeout: 5,
            default_currency: "USD".to_string(),
            price_selectors: vec![
                ".price".to_string(),
                "[itemprop=price]".to_string(),
                r#"meta[property="product:price:amount"]"#.to_string(),
            ],
        },
        sync: SyncConfig {
            max_concurrent_jobs: 4,
            retry_attempts: 2,
            retry_base_delay_ms: 1,
            page_size: 50,
            refresh_margin_secs: 300,
        },
        scheduler: SchedulerConfig {
            enabled: false,
            sync_interval: "0 * * * *".to_string(),
        },
        platforms: PlatformsConfig {
            etsy: EtsyConfig {
                api_base: etsy_base.to_string(),
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_uri: "http://localhost/callback".to_string(),
            },
        },
    }
}

/// Fully wired engine backed by in-memory SQLite and real HTTP components.
pub struct Engine {
    pub storage: Arc<SqliteStorage>,
    pub token_manager: Arc<TokenManager>,
    pub orchestrator: SyncOrchestrator,
}

pub async fn build_engine(etsy_base: &str) -> Engine {
    let config = test_config(etsy_base);

    let storage = Arc::new(
        SqliteStorage::connect(&config.database.url, config.database.max_connections)
            .await
            .expect("in-memory database"),
    );
    let writer = ReconciliationWriter::new(storage.clone());
    let registry = ConnectorRegistry::from_config(&config).expect("connector registry");
    let token_manager = Arc::new(TokenManager::new(
        storage.clone(),
        registry.clone(),
        writer.clone(),
        config.sync.refresh_margin_secs,
    ));
    let extractor: Arc<dyn PageExtractor> =
        Arc::new(PriceExtractor::new(config.extractor.clone()).expect("extractor"));

    let orchestrator = SyncOrchestrator::new(
        storage.clone(),
        writer,
        token_manager.clone(),
        registry,
        extractor,
        config.sync.clone(),
    );

    Engine { storage, token_manager, orchestrator }
}
