use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tradeos_core::sync::{SyncRequest, SyncTask, SyncTicket};

use crate::{
    error::ApiResult,
    main_lib::AppState,
    models::{SyncTriggerRequest, SyncTriggerResponse},
};

fn accepted(ticket: SyncTicket, message: String) -> (StatusCode, Json<SyncTriggerResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(SyncTriggerResponse {
            task_id: ticket.task_id,
            status: ticket.status,
            message,
        }),
    )
}

async fn sync_integration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncTriggerRequest>,
) -> ApiResult<(StatusCode, Json<SyncTriggerResponse>)> {
    let request = SyncRequest {
        entity_type: payload.entity_type,
        integration_id: Some(id.clone()),
        sync_type: payload.sync_type,
    };
    let ticket = state.orchestrator.run_sync(request)?;
    let message = format!(
        "{} sync started for integration {}",
        payload.entity_type, id
    );
    Ok(accepted(ticket, message))
}

async fn sync_all(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncTriggerRequest>,
) -> ApiResult<(StatusCode, Json<SyncTriggerResponse>)> {
    let request = SyncRequest {
        entity_type: payload.entity_type,
        integration_id: None,
        sync_type: payload.sync_type,
    };
    let ticket = state.orchestrator.run_sync(request)?;
    let message = format!(
        "{} sync started for all eligible integrations",
        payload.entity_type
    );
    Ok(accepted(ticket, message))
}

async fn get_task(
    Path(task_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SyncTask>> {
    Ok(Json(state.orchestrator.task(&task_id)?))
}

async fn cancel_task(
    Path(task_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SyncTask>> {
    Ok(Json(state.orchestrator.cancel_task(&task_id)?))
}

async fn list_active_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<SyncTask>> {
    Json(state.orchestrator.active_tasks())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/integrations/{id}/sync", post(sync_integration))
        .route("/sync", post(sync_all))
        .route("/sync/tasks", get(list_active_tasks))
        .route("/sync/tasks/{task_id}", get(get_task))
        .route("/sync/tasks/{task_id}/cancel", post(cancel_task))
}
