use chrono::{Duration, Utc};
use std::sync::Arc;

use super::*;
use crate::errors::{DatabaseError, Error};
use crate::sync::{EntityType, SyncCounters, SyncLog, SyncLogStatus, SyncType};
use crate::test_support::*;

struct Fixture {
    service: IntegrationService,
    integrations: MockIntegrationRepository,
    logs: MockSyncLogRepository,
    clients: ScriptedClientFactory,
}

fn fixture() -> Fixture {
    let integrations = MockIntegrationRepository::new();
    let logs = MockSyncLogRepository::new();
    let clients = ScriptedClientFactory::new();
    let service = IntegrationService::new(
        Arc::new(integrations.clone()),
        Arc::new(logs.clone()),
        Arc::new(clients.clone()),
    );
    Fixture {
        service,
        integrations,
        logs,
        clients,
    }
}

fn finished_log(integration_id: &str, hours_ago: i64, status: SyncLogStatus) -> SyncLog {
    let mut log = SyncLog::new(
        integration_id.to_string(),
        None,
        SyncType::Incremental,
        EntityType::Nomenclature,
    );
    log.started_at = Utc::now() - Duration::hours(hours_ago);
    let counters = SyncCounters {
        total: 10,
        processed: 10,
        created: 4,
        updated: 6,
        failed: 0,
    };
    match status {
        SyncLogStatus::Completed => log.complete(counters, &[]),
        SyncLogStatus::Failed => log.fail(counters, "boom".to_string(), &[]),
        SyncLogStatus::Pending | SyncLogStatus::Running => {}
    }
    log
}

#[tokio::test]
async fn test_integration_names_are_unique() {
    let f = fixture();
    let first = f.service.create_integration(new_integration("erp")).await.unwrap();
    let second = f.service.create_integration(new_integration("shop")).await.unwrap();

    let duplicate = f.service.create_integration(new_integration("erp")).await;
    assert!(matches!(
        duplicate,
        Err(Error::Database(DatabaseError::UniqueViolation(_)))
    ));

    let rename_clash = f
        .service
        .update_integration(
            &second.id,
            IntegrationUpdate {
                name: Some("erp".to_string()),
                ..IntegrationUpdate::default()
            },
        )
        .await;
    assert!(rename_clash.is_err());

    // Keeping one's own name is not a clash.
    let same = f
        .service
        .update_integration(
            &first.id,
            IntegrationUpdate {
                name: Some("erp".to_string()),
                sync_interval_secs: Some(900),
                ..IntegrationUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(same.sync_interval_secs, 900);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let f = fixture();
    let mut bad_url = new_integration("erp");
    bad_url.base_url = "ftp://1c".to_string();
    assert!(f.service.create_integration(bad_url).await.is_err());

    let mut bad_settings = new_integration("erp");
    bad_settings.settings.page_size = 0;
    assert!(matches!(
        f.service.create_integration(bad_settings).await,
        Err(Error::InvalidConfigValue(_))
    ));
    assert!(f.service.list_integrations(None, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_disable_is_a_soft_delete() {
    let f = fixture();
    let created = f.service.create_integration(new_integration("erp")).await.unwrap();

    let disabled = f.service.set_enabled(&created.id, false).await.unwrap();
    assert!(!disabled.is_enabled);
    assert_eq!(disabled.status, IntegrationStatus::Inactive);
    assert_eq!(f.service.list_integrations(Some(true), None).unwrap().len(), 0);
    assert_eq!(f.service.list_integrations(Some(false), None).unwrap().len(), 1);

    let enabled = f.service.set_enabled(&created.id, true).await.unwrap();
    assert_eq!(enabled.status, IntegrationStatus::Active);
}

#[tokio::test]
async fn test_health_sweep_records_results() {
    let f = fixture();
    let up = f.service.create_integration(new_integration("up")).await.unwrap();
    let down = f.service.create_integration(new_integration("down")).await.unwrap();
    let off = f.service.create_integration(new_integration("off")).await.unwrap();
    f.service.set_enabled(&off.id, false).await.unwrap();

    let down_api = ScriptedOneC::with_products(Vec::new());
    down_api.set_unhealthy(true);
    f.clients.register(&up.id, ScriptedOneC::with_products(Vec::new()));
    f.clients.register(&down.id, down_api);

    let reports = f.service.check_all().await.unwrap();
    assert_eq!(reports.len(), 2);
    let up_report = reports.iter().find(|r| r.integration_id == up.id).unwrap();
    assert!(up_report.healthy);
    assert!(up_report.response_time_ms.is_some());
    let down_report = reports.iter().find(|r| r.integration_id == down.id).unwrap();
    assert!(!down_report.healthy);
    assert!(down_report.error.is_some());

    let stored_down = f.integrations.get_by_id(&down.id).unwrap();
    assert!(!stored_down.is_healthy);
    assert_eq!(stored_down.status, IntegrationStatus::Error);
    assert!(stored_down.last_health_check.is_some());
    assert!(f.integrations.get_by_id(&off.id).unwrap().last_health_check.is_none());

    // A passing probe restores the active status.
    let recovered = ScriptedOneC::with_products(Vec::new());
    f.clients.register(&down.id, recovered);
    f.service.check_all().await.unwrap();
    let stored_down = f.integrations.get_by_id(&down.id).unwrap();
    assert!(stored_down.is_healthy);
    assert_eq!(stored_down.status, IntegrationStatus::Active);
}

#[tokio::test]
async fn test_health_sweep_continues_past_a_failed_write() {
    let f = fixture();
    let stuck = f.service.create_integration(new_integration("stuck")).await.unwrap();
    let next = f.service.create_integration(new_integration("next")).await.unwrap();
    f.clients.register(&stuck.id, ScriptedOneC::with_products(Vec::new()));
    f.clients.register(&next.id, ScriptedOneC::with_products(Vec::new()));
    f.integrations.fail_outcomes_for(&stuck.id);

    let reports = f.service.check_all().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.healthy));

    assert!(f.integrations.get_by_id(&stuck.id).unwrap().last_health_check.is_none());
    assert!(f.integrations.get_by_id(&next.id).unwrap().last_health_check.is_some());
}

#[tokio::test]
async fn test_connection_test_leaves_state_untouched() {
    let f = fixture();
    let created = f.service.create_integration(new_integration("erp")).await.unwrap();
    f.clients.register(
        &created.id,
        ScriptedOneC::with_products(products(1)),
    );

    let result = f.service.test_connection(&created.id).await.unwrap();
    assert!(result.success);
    assert_eq!(result.health, Some(true));
    assert_eq!(result.can_fetch_data, Some(true));
    assert!(f.integrations.outcomes().is_empty());
}

#[tokio::test]
async fn test_stats_include_ten_most_recent_runs() {
    let f = fixture();
    let created = f.service.create_integration(new_integration("erp")).await.unwrap();
    for hours_ago in 0..12 {
        f.logs
            .insert(finished_log(&created.id, hours_ago, SyncLogStatus::Completed));
    }
    f.integrations
        .record_outcome(
            &created.id,
            IntegrationOutcome::SyncSucceeded {
                at: Utc::now(),
                response_time_ms: Some(120.0),
            },
        )
        .await
        .unwrap();
    f.integrations
        .record_outcome(
            &created.id,
            IntegrationOutcome::SyncFailed {
                at: Utc::now(),
                error: "timeout".to_string(),
            },
        )
        .await
        .unwrap();

    let stats = f.service.integration_stats(&created.id).unwrap();
    assert_eq!(stats.total_syncs, 2);
    assert_eq!(stats.success_rate, 50.0);
    assert_eq!(stats.avg_response_time_ms, Some(120.0));
    assert_eq!(stats.last_error.as_deref(), Some("timeout"));
    assert_eq!(stats.recent_runs.len(), RECENT_RUNS as usize);
    assert!(stats
        .recent_runs
        .windows(2)
        .all(|pair| pair[0].started_at >= pair[1].started_at));
}

#[tokio::test]
async fn test_overview_aggregates_window_and_clamps_hours() {
    let f = fixture();
    f.logs.insert(finished_log("a", 1, SyncLogStatus::Completed));
    f.logs.insert(finished_log("a", 2, SyncLogStatus::Failed));
    f.logs.insert(finished_log("b", 3, SyncLogStatus::Running));
    f.logs.insert(finished_log("b", 48, SyncLogStatus::Completed));

    let overview = f.service.sync_status_overview(24).unwrap();
    assert_eq!(overview.period_hours, 24);
    assert_eq!(overview.total_runs, 3);
    assert_eq!(overview.completed_runs, 1);
    assert_eq!(overview.failed_runs, 1);
    assert_eq!(overview.running_runs, 1);
    let nomenclature = &overview.by_entity["nomenclature"];
    assert_eq!(nomenclature.runs, 3);
    assert_eq!(nomenclature.created, 8);

    assert_eq!(f.service.sync_status_overview(0).unwrap().period_hours, 1);
    let week = f.service.sync_status_overview(1000).unwrap();
    assert_eq!(week.period_hours, 168);
    assert_eq!(week.total_runs, 4);
}

#[tokio::test]
async fn test_cleanup_removes_only_old_finalized_logs() {
    let f = fixture();
    f.logs.insert(finished_log("a", 24 * 40, SyncLogStatus::Completed));
    f.logs.insert(finished_log("a", 24 * 40, SyncLogStatus::Running));
    f.logs.insert(finished_log("a", 1, SyncLogStatus::Completed));

    let deleted = f.service.cleanup_sync_logs(30).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(f.logs.all().len(), 2);
}
