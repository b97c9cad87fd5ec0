use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use specflow::{SteeringKind, SteeringStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SteeringDocument {
    pub kind: SteeringKind,
    pub content: String,
}

/// GET /api/steering
async fn status(State(state): State<AppState>) -> Json<SteeringStatus> {
    Json(state.workflow.steering_status())
}

/// GET /api/steering/{kind}
async fn document(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<SteeringDocument>> {
    let kind: SteeringKind = kind
        .parse()
        .map_err(|e: specflow::WorkflowError| ApiError::BadRequest(e.to_string()))?;
    let content = state.workflow.read_steering(kind)?;
    Ok(Json(SteeringDocument { kind, content }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/steering", get(status))
        .route("/steering/{kind}", get(document))
}
