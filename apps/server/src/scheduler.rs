//! Background loops: periodic syncs, health sweeps, log retention and
//! WebSocket pings.
//!
//! Every loop stops when the state's shutdown token is cancelled.

use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use tradeos_core::integrations::IntegrationServiceTrait;
use tradeos_core::sync::{EntityType, SyncRequest, TaskStatus};

use crate::config::Config;
use crate::main_lib::AppState;

/// Delay before the first scheduled sync so the server can finish starting.
const INITIAL_DELAY_SECS: u64 = 30;

/// Retention sweeps run once a day.
const RETENTION_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Starts every background loop.
pub fn start_schedulers(state: Arc<AppState>, config: &Config) {
    let initial_delay = Duration::from_secs(INITIAL_DELAY_SECS);

    for (entity_type, every) in [
        (EntityType::Nomenclature, config.nomenclature_interval),
        (EntityType::Stock, config.stock_interval),
    ] {
        let state_for_sync = state.clone();
        spawn_loop(&state, "sync", initial_delay, every, move || {
            let state = state_for_sync.clone();
            async move { run_scheduled_sync(&state, entity_type).await }
        });
    }

    let state_for_health = state.clone();
    spawn_loop(&state, "health", initial_delay, config.health_check_interval, move || {
        let state = state_for_health.clone();
        async move { run_health_sweep(&state).await }
    });

    let state_for_retention = state.clone();
    let retention_days = config.sync_log_retention_days;
    spawn_loop(
        &state,
        "retention",
        initial_delay,
        Duration::from_secs(RETENTION_INTERVAL_SECS),
        move || {
            let state = state_for_retention.clone();
            async move { run_retention(&state, retention_days).await }
        },
    );

    let broadcaster = state.broadcaster.clone();
    spawn_loop(&state, "ping", state.ws_ping_interval, state.ws_ping_interval, move || {
        let broadcaster = broadcaster.clone();
        async move { broadcaster.ping_all() }
    });

    info!(
        "Schedulers started (nomenclature every {:?}, stock every {:?}, health every {:?})",
        config.nomenclature_interval, config.stock_interval, config.health_check_interval
    );
}

fn spawn_loop<F, Fut>(
    state: &Arc<AppState>,
    name: &'static str,
    initial_delay: Duration,
    every: Duration,
    mut job: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(initial_delay) => {}
        }

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => job().await,
            }
        }
        debug!("Scheduler loop '{}' stopped", name);
    });
}

async fn run_scheduled_sync(state: &Arc<AppState>, entity_type: EntityType) {
    debug!("Running scheduled {} sync", entity_type);
    match state.orchestrator.run_now(SyncRequest::all(entity_type)).await {
        Ok(report) if report.status == TaskStatus::Skipped => {
            debug!("Scheduled {} sync skipped: no integrations to sync", entity_type);
        }
        Ok(report) => {
            let totals = report.totals();
            info!(
                "Scheduled {} sync {:?}: {} created, {} updated, {} failed",
                entity_type, report.status, totals.created, totals.updated, totals.failed
            );
        }
        Err(e) => warn!("Scheduled {} sync failed: {}", entity_type, e),
    }
}

async fn run_health_sweep(state: &Arc<AppState>) {
    match state.integration_service.check_all().await {
        Ok(reports) => {
            let unhealthy = reports.iter().filter(|r| !r.healthy).count();
            debug!(
                "Health sweep checked {} integration(s), {} unhealthy",
                reports.len(),
                unhealthy
            );
        }
        Err(e) => warn!("Health sweep failed: {}", e),
    }
}

async fn run_retention(state: &Arc<AppState>, retention_days: i64) {
    if let Err(e) = state
        .integration_service
        .cleanup_sync_logs(retention_days)
        .await
    {
        warn!("Sync log retention failed: {}", e);
    }
}
