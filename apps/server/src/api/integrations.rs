use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tradeos_core::{
    integrations::{
        IntegrationServiceTrait, IntegrationStats, IntegrationUpdate, NewIntegration,
        SyncStatusOverview,
    },
    sync::{EntityType, SyncLog, SyncLogFilter, SyncLogStatus},
};
use tradeos_onec::ConnectionTestResult;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
    models::{IntegrationListQuery, IntegrationResponse, SyncLogQuery, SyncStatusQuery},
};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;
const DEFAULT_OVERVIEW_HOURS: i64 = 24;

async fn list_integrations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IntegrationListQuery>,
) -> ApiResult<Json<Vec<IntegrationResponse>>> {
    let integrations = state
        .integration_service
        .list_integrations(query.is_enabled, query.integration_type.as_deref())?;
    Ok(Json(
        integrations
            .into_iter()
            .map(IntegrationResponse::from)
            .collect(),
    ))
}

async fn create_integration(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewIntegration>,
) -> ApiResult<(StatusCode, Json<IntegrationResponse>)> {
    let created = state
        .integration_service
        .create_integration(payload)
        .await?;
    tracing::info!("Created integration '{}' ({})", created.name, created.id);
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn get_integration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<IntegrationResponse>> {
    let integration = state.integration_service.get_integration(&id)?;
    Ok(Json(integration.into()))
}

async fn update_integration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IntegrationUpdate>,
) -> ApiResult<Json<IntegrationResponse>> {
    let updated = state
        .integration_service
        .update_integration(&id, payload)
        .await?;
    Ok(Json(updated.into()))
}

/// Integrations are never hard-deleted; DELETE disables.
async fn delete_integration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    state.integration_service.set_enabled(&id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn enable_integration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<IntegrationResponse>> {
    let integration = state.integration_service.set_enabled(&id, true).await?;
    Ok(Json(integration.into()))
}

async fn disable_integration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<IntegrationResponse>> {
    let integration = state.integration_service.set_enabled(&id, false).await?;
    Ok(Json(integration.into()))
}

async fn test_connection(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ConnectionTestResult>> {
    let result = state.integration_service.test_connection(&id).await?;
    Ok(Json(result))
}

fn log_filter(query: SyncLogQuery) -> ApiResult<SyncLogFilter> {
    let status = query
        .status
        .as_deref()
        .map(SyncLogStatus::from_str)
        .transpose()?;
    let entity_type = query
        .entity_type
        .as_deref()
        .map(EntityType::from_str)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if !(1..=MAX_LOG_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LOG_LIMIT
        )));
    }
    Ok(SyncLogFilter {
        status,
        entity_type,
        skip: query.skip.unwrap_or(0).max(0),
        limit,
    })
}

async fn get_sync_logs(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncLogQuery>,
) -> ApiResult<Json<Vec<SyncLog>>> {
    let filter = log_filter(query)?;
    state.integration_service.get_integration(&id)?;
    let logs = state.sync_log_repository.list_for_integration(&id, &filter)?;
    Ok(Json(logs))
}

async fn get_integration_stats(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<IntegrationStats>> {
    let stats = state.integration_service.integration_stats(&id)?;
    Ok(Json(stats))
}

async fn get_sync_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncStatusQuery>,
) -> ApiResult<Json<SyncStatusOverview>> {
    let hours = query.last_hours.unwrap_or(DEFAULT_OVERVIEW_HOURS);
    let overview = state.integration_service.sync_status_overview(hours)?;
    Ok(Json(overview))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/integrations",
            get(list_integrations).post(create_integration),
        )
        .route(
            "/integrations/{id}",
            get(get_integration)
                .put(update_integration)
                .delete(delete_integration),
        )
        .route("/integrations/{id}/enable", post(enable_integration))
        .route("/integrations/{id}/disable", post(disable_integration))
        .route("/integrations/{id}/test-connection", post(test_connection))
        .route("/integrations/{id}/sync-logs", get(get_sync_logs))
        .route("/integrations/{id}/stats", get(get_integration_stats))
        .route("/sync-status", get(get_sync_status))
}
