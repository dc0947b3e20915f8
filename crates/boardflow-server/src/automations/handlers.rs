//! Automation API handlers.
//!
//! Cycle trigger, configuration presence report, recent logs and the
//! debug/repair endpoints used by the board settings UI.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{FromRef, State};
use axum::routing::get;
use boardflow_api::ApiError;
use boardflow_storage::{
    AutomationLogEntry, AutomationRecord, BoardStore, ChangeEvent, Column, ErrorCategory,
    StorageError,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info};

use super::coordinator::{CycleReport, RunCoordinator};
use super::types::TriggerType;
use crate::config::{ClaimStrategy, ConfigPresence};

const RECENT_LOGS_LIMIT: usize = 50;
const DEBUG_SAMPLE_LIMIT: usize = 10;

// =============================================================================
// State
// =============================================================================

/// State for automation handlers.
#[derive(Clone)]
pub struct AutomationState {
    pub store: Arc<dyn BoardStore>,
    pub coordinator: Arc<RunCoordinator>,
    pub presence: ConfigPresence,
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub board_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub status: &'static str,
    pub storage_backend: &'static str,
    pub claim_strategy: ClaimStrategy,
    pub config: ConfigPresence,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<AutomationLogEntry>,
}

#[derive(Debug, Serialize)]
pub struct DebugSnapshot {
    pub columns: Vec<Column>,
    pub automations: Vec<AutomationRecord>,
    pub events: Vec<ChangeEvent>,
    pub logs: Vec<AutomationLogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAutomationRequest {
    pub automation_id: String,
    pub column_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTriggerRequest {
    #[serde(default)]
    pub board_id: Option<String>,
}

fn storage_error(e: StorageError) -> ApiError {
    match e.category() {
        ErrorCategory::NotFound => ApiError::not_found(e.to_string()),
        ErrorCategory::Validation => ApiError::bad_request(e.to_string()),
        ErrorCategory::Infrastructure | ErrorCategory::Internal => {
            ApiError::internal(e.to_string())
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/automation/process - Run one cycle.
///
/// The body is optional; an empty or unreadable body processes every board.
pub async fn process_events(
    State(state): State<AutomationState>,
    body: Bytes,
) -> Result<Json<CycleReport>, ApiError> {
    let req = if body.is_empty() {
        ProcessRequest::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Ignoring unreadable process request body");
            ProcessRequest::default()
        })
    };

    let report = state
        .coordinator
        .run_cycle(non_empty(req.board_id.as_deref()))
        .await
        .map_err(|e| {
            error!(error = %e, "Automation cycle failed");
            ApiError::internal(e.to_string())
        })?;
    Ok(Json(report))
}

/// GET /api/automation/process - Report which options are configured.
pub async fn process_status(State(state): State<AutomationState>) -> Json<ProcessStatus> {
    Json(ProcessStatus {
        status: "ok",
        storage_backend: state.store.backend_name(),
        claim_strategy: state.coordinator.config().claim_strategy,
        config: state.presence,
    })
}

/// GET /api/automation/logs - Most recent logs with their rule.
pub async fn list_logs(
    State(state): State<AutomationState>,
) -> Result<Json<LogsResponse>, ApiError> {
    let logs = state
        .store
        .list_recent_logs(RECENT_LOGS_LIMIT)
        .await
        .map_err(storage_error)?;
    Ok(Json(LogsResponse { logs }))
}

/// GET /api/automation/debug - Status columns, status rules, recent events
/// and logs.
pub async fn debug_snapshot(
    State(state): State<AutomationState>,
) -> Result<Json<DebugSnapshot>, ApiError> {
    let store = &state.store;
    let columns = store.list_status_columns().await.map_err(storage_error)?;
    let automations = store
        .list_automations_by_trigger(TriggerType::STATUS_CHANGED)
        .await
        .map_err(storage_error)?;
    let events = store
        .list_recent_events(DEBUG_SAMPLE_LIMIT)
        .await
        .map_err(storage_error)?;
    let logs = store
        .list_recent_logs(DEBUG_SAMPLE_LIMIT)
        .await
        .map_err(storage_error)?;

    Ok(Json(DebugSnapshot {
        columns,
        automations,
        events,
        logs,
    }))
}

/// POST /api/automation/debug - `fix_automation` or `test_trigger`.
pub async fn debug_action(
    State(state): State<AutomationState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;

    match body.get("action").and_then(Value::as_str) {
        Some("fix_automation") => {
            let req: FixAutomationRequest = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            fix_automation(&state, req).await
        }
        Some("test_trigger") => {
            let req: TestTriggerRequest = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            Ok(test_trigger(&state, req).await)
        }
        _ => Err(ApiError::bad_request("Invalid action")),
    }
}

async fn fix_automation(
    state: &AutomationState,
    req: FixAutomationRequest,
) -> Result<Json<Value>, ApiError> {
    let automation = state
        .store
        .get_automation(&req.automation_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found("Automation not found"))?;

    let mut trigger = match automation.trigger_config {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    trigger.insert("column_id".into(), Value::String(req.column_id.clone()));

    state
        .store
        .update_trigger_config(&req.automation_id, &Value::Object(trigger))
        .await
        .map_err(storage_error)?;

    info!(
        automation_id = %req.automation_id,
        column_id = %req.column_id,
        "Trigger column repaired"
    );
    Ok(Json(json!({ "success": true })))
}

async fn test_trigger(state: &AutomationState, req: TestTriggerRequest) -> Json<Value> {
    match state
        .coordinator
        .run_cycle(non_empty(req.board_id.as_deref()))
        .await
    {
        Ok(report) => Json(json!({ "status": 200, "data": report })),
        Err(e) => {
            error!(error = %e, "Test trigger cycle failed");
            Json(json!({ "status": 500, "data": { "error": e.to_string() } }))
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the automation router.
pub fn automation_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AutomationState: FromRef<S>,
{
    Router::new()
        .route(
            "/api/automation/process",
            get(process_status).post(process_events),
        )
        .route("/api/automation/logs", get(list_logs))
        .route(
            "/api/automation/debug",
            get(debug_snapshot).post(debug_action),
        )
}
