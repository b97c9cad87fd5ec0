//! Route handlers for the reviewer surface.

pub mod approvals;
pub mod health;
pub mod specs;
pub mod steering;
pub mod ws;

use axum::Router;

use crate::state::AppState;

/// Every route, REST under `/api` plus the push channel at `/ws`.
///
/// Routes:
/// - GET  /api/health
/// - GET  /api/specs, /api/specs/archived, /api/specs/{name}
/// - GET  /api/specs/{name}/documents/{kind}
/// - PUT  /api/specs/{name}/documents/{kind}
/// - GET  /api/specs/{name}/tasks
/// - PUT  /api/specs/{name}/tasks/{id}/status
/// - POST /api/specs/{name}/archive, /api/specs/{name}/unarchive
/// - GET  /api/approvals, /api/approvals/{id}, /api/approvals/{id}/content
/// - POST /api/approvals/{id}/decision
/// - GET  /api/steering, /api/steering/{kind}
/// - GET  /ws
pub fn api_routes(state: AppState) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(specs::router())
        .merge(approvals::router())
        .merge(steering::router());
    Router::new()
        .nest("/api", api)
        .merge(ws::router())
        .with_state(state)
}
