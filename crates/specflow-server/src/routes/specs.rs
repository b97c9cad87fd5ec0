//! Specification, document and task routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use specflow::{DocumentKind, ParsedTasks, SpecLocation, SpecSummary, TaskRecord, TaskStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub name: String,
    pub kind: DocumentKind,
    pub location: SpecLocation,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveDocumentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResponse {
    pub name: String,
    pub location: SpecLocation,
}

/// GET /api/specs
async fn list_active(State(state): State<AppState>) -> ApiResult<Json<Vec<SpecSummary>>> {
    Ok(Json(state.workflow.list_specs(SpecLocation::Active)?))
}

/// GET /api/specs/archived
async fn list_archived(State(state): State<AppState>) -> ApiResult<Json<Vec<SpecSummary>>> {
    Ok(Json(state.workflow.list_specs(SpecLocation::Archived)?))
}

/// GET /api/specs/{name}
async fn get_spec(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SpecSummary>> {
    Ok(Json(state.workflow.spec_summary(&name)?))
}

fn parse_kind(kind: &str) -> ApiResult<DocumentKind> {
    kind.parse()
        .map_err(|e: specflow::WorkflowError| ApiError::BadRequest(e.to_string()))
}

/// GET /api/specs/{name}/documents/{kind}
async fn get_document(
    State(state): State<AppState>,
    Path((name, kind)): Path<(String, String)>,
) -> ApiResult<Json<DocumentResponse>> {
    let kind = parse_kind(&kind)?;
    let location = state.workflow.require_location(&name)?;
    let content = state.workflow.read_document(&name, kind)?;
    Ok(Json(DocumentResponse {
        name,
        kind,
        location,
        content,
    }))
}

/// PUT /api/specs/{name}/documents/{kind}
async fn save_document(
    State(state): State<AppState>,
    Path((name, kind)): Path<(String, String)>,
    Json(body): Json<SaveDocumentRequest>,
) -> ApiResult<Json<DocumentResponse>> {
    let kind = parse_kind(&kind)?;
    state.workflow.save_document(&name, kind, &body.content)?;
    Ok(Json(DocumentResponse {
        name,
        kind,
        location: SpecLocation::Active,
        content: body.content,
    }))
}

/// GET /api/specs/{name}/tasks
async fn get_tasks(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ParsedTasks>> {
    Ok(Json(state.workflow.read_tasks(&name)?))
}

/// PUT /api/specs/{name}/tasks/{id}/status
async fn set_task_status(
    State(state): State<AppState>,
    Path((name, task_id)): Path<(String, String)>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<Json<TaskRecord>> {
    let status: TaskStatus = body
        .status
        .parse()
        .map_err(|e: specflow::WorkflowError| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(state.workflow.set_task_status(&name, &task_id, status)?))
}

/// POST /api/specs/{name}/archive
async fn archive(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<LocationResponse>> {
    state.workflow.archive(&name)?;
    Ok(Json(LocationResponse {
        name,
        location: SpecLocation::Archived,
    }))
}

/// POST /api/specs/{name}/unarchive
async fn unarchive(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<LocationResponse>> {
    state.workflow.unarchive(&name)?;
    Ok(Json(LocationResponse {
        name,
        location: SpecLocation::Active,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/specs", get(list_active))
        .route("/specs/archived", get(list_archived))
        .route("/specs/{name}", get(get_spec))
        .route(
            "/specs/{name}/documents/{kind}",
            get(get_document).put(save_document),
        )
        .route("/specs/{name}/tasks", get(get_tasks))
        .route("/specs/{name}/tasks/{id}/status", put(set_task_status))
        .route("/specs/{name}/archive", post(archive))
        .route("/specs/{name}/unarchive", post(unarchive))
}
