//! Approval review routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use specflow::{ApprovalRecord, Comment, Decision};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub decision: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub annotations: Option<String>,
    #[serde(default)]
    pub comments: Option<Vec<Comment>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub id: String,
    pub file_path: String,
    pub content: String,
}

/// GET /api/approvals
async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<ApprovalRecord>>> {
    Ok(Json(state.workflow.approvals().list()?))
}

/// GET /api/approvals/{id}
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApprovalRecord>> {
    Ok(Json(state.workflow.approvals().get(&id)?))
}

/// GET /api/approvals/{id}/content
async fn content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContentResponse>> {
    let record = state.workflow.approvals().get(&id)?;
    let content = state.workflow.approval_content(&id)?;
    Ok(Json(ContentResponse {
        id,
        file_path: record.file_path,
        content,
    }))
}

/// POST /api/approvals/{id}/decision
async fn decide(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> ApiResult<Json<ApprovalRecord>> {
    let decision: Decision = body
        .decision
        .parse()
        .map_err(|e: specflow::WorkflowError| ApiError::BadRequest(e.to_string()))?;
    if decision == Decision::NeedsRevision
        && body.response.trim().is_empty()
        && body.comments.as_ref().is_none_or(Vec::is_empty)
    {
        return Err(ApiError::BadRequest(
            "a revision request needs a response or comments".to_string(),
        ));
    }
    let record = state.workflow.approvals().transition(
        &id,
        decision,
        body.response,
        body.annotations,
        body.comments,
    )?;
    Ok(Json(record))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/approvals", get(list))
        .route("/approvals/{id}", get(get_one))
        .route("/approvals/{id}/content", get(content))
        .route("/approvals/{id}/decision", post(decide))
}
