use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use tradeos_core::{
    events::{Broadcaster, EventPublisher},
    integrations::{ClientFactory, IntegrationService, OneCClientFactory},
    sync::{SyncConfig, SyncLogRepositoryTrait, SyncOrchestrator},
};
use tradeos_storage_sqlite::{
    db::{self, write_actor},
    CatalogRepository, IntegrationRepository, SyncLogRepository,
};

pub struct AppState {
    pub integration_service: Arc<IntegrationService>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub sync_log_repository: Arc<dyn SyncLogRepositoryTrait>,
    pub broadcaster: Broadcaster,
    /// Cancelled on shutdown; stops the dispatcher, the scheduler loops and
    /// every running sync task.
    pub shutdown: CancellationToken,
    pub db_path: String,
    pub ws_ping_interval: std::time::Duration,
}

pub fn init_tracing() {
    let log_format = std::env::var("TS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = write_actor::spawn_writer((*pool).clone());

    let integration_repository =
        Arc::new(IntegrationRepository::new(pool.clone(), writer.clone()));
    let catalog_repository = Arc::new(CatalogRepository::new(pool.clone(), writer.clone()));
    let sync_log_repository: Arc<dyn SyncLogRepositoryTrait> =
        Arc::new(SyncLogRepository::new(pool.clone(), writer.clone()));
    let clients: Arc<dyn ClientFactory> = Arc::new(OneCClientFactory::new());

    let shutdown = CancellationToken::new();
    let broadcaster = Broadcaster::new();
    broadcaster.start(shutdown.child_token());

    let integration_service = Arc::new(IntegrationService::new(
        integration_repository.clone(),
        sync_log_repository.clone(),
        clients.clone(),
    ));

    let events: Arc<dyn EventPublisher> = Arc::new(broadcaster.clone());
    let orchestrator = Arc::new(SyncOrchestrator::new(
        integration_repository,
        catalog_repository,
        sync_log_repository.clone(),
        clients,
        events,
        SyncConfig::default(),
        shutdown.child_token(),
    ));

    Ok(Arc::new(AppState {
        integration_service,
        orchestrator,
        sync_log_repository,
        broadcaster,
        shutdown,
        db_path,
        ws_ping_interval: config.ws_ping_interval,
    }))
}
