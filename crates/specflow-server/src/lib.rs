//! Reviewer surface for a specflow workflow tree.
//!
//! Serves a REST API over the workflow engine and a WebSocket at `/ws` that
//! pushes state changes as they happen on disk.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;

use anyhow::Context;
use axum::Router;
use specflow::{Config, SpecWorkflow, WorkflowWatcher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Builds the application with CORS and request tracing.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Watches the workflow tree, feeds changes to the hub and serves until the
/// listener fails or ctrl-c is received.
pub async fn serve(workflow: SpecWorkflow, config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(workflow.clone(), config.observer_buffer);

    let (tx, rx) = mpsc::channel(config.watch_buffer.max(1));
    let watcher = WorkflowWatcher::start(workflow.paths(), tx)
        .context("failed to watch workflow directory")?;
    let hub_task = tokio::spawn(Arc::clone(&state.hub).run(rx));

    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(
        address = %listener.local_addr()?,
        root = %watcher.root().display(),
        "Serving workflow"
    );

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    watcher.stop();
    hub_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use specflow::{ApprovalType, NewApproval, WorkflowPaths};
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const TASKS: &str = "# Tasks\n\n- [ ] 1. Setup\n- [ ] 2. Build\n";

    fn setup() -> (TempDir, AppState) {
        let temp = TempDir::new().unwrap();
        let paths = WorkflowPaths::new(temp.path());
        let dir = paths.specs_dir().join("auth");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tasks.md"), TASKS).unwrap();
        fs::write(dir.join("requirements.md"), "# Requirements\n").unwrap();
        let state = AppState::new(SpecWorkflow::new(paths), 8);
        (temp, state)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
        send(create_app(state.clone()), Method::GET, uri, None).await
    }

    #[tokio::test]
    async fn test_health() {
        let (_temp, state) = setup();
        let (status, body) = get(&state, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["observers"], 0);
    }

    #[tokio::test]
    async fn test_list_specs_and_documents() {
        let (_temp, state) = setup();
        let (status, body) = get(&state, "/api/specs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "auth");
        assert_eq!(body[0]["taskProgress"]["total"], 2);

        let (status, body) = get(&state, "/api/specs/archived").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = get(&state, "/api/specs/auth/documents/requirements").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "# Requirements\n");
        assert_eq!(body["location"], "active");

        let (status, _) = get(&state, "/api/specs/auth/documents/design").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(&state, "/api/specs/auth/documents/readme").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_save_document() {
        let (_temp, state) = setup();
        let (status, _) = send(
            create_app(state.clone()),
            Method::PUT,
            "/api/specs/auth/documents/design",
            Some(json!({"content": "# Design\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            state
                .workflow
                .read_document("auth", specflow::DocumentKind::Design)
                .unwrap(),
            "# Design\n"
        );
    }

    #[tokio::test]
    async fn test_task_status_flow() {
        let (_temp, state) = setup();
        let (status, body) = send(
            create_app(state.clone()),
            Method::PUT,
            "/api/specs/auth/tasks/1/status",
            Some(json!({"status": "in-progress"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "in-progress");

        let (status, body) = send(
            create_app(state.clone()),
            Method::PUT,
            "/api/specs/auth/tasks/2/status",
            Some(json!({"status": "in-progress"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["details"].as_str().unwrap().contains('1'));

        let (status, _) = send(
            create_app(state.clone()),
            Method::PUT,
            "/api/specs/auth/tasks/9/status",
            Some(json!({"status": "completed"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get(&state, "/api/specs/auth/tasks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inProgress"], "1");
        assert_eq!(body["summary"]["inProgress"], 1);
    }

    #[tokio::test]
    async fn test_archive_blocked_then_allowed() {
        let (_temp, state) = setup();
        let record = state
            .workflow
            .approvals()
            .create(NewApproval {
                title: "Requirements".to_string(),
                file_path: "requirements.md".to_string(),
                category_name: "auth".to_string(),
                approval_type: ApprovalType::Document,
            })
            .unwrap();

        let (status, body) = send(
            create_app(state.clone()),
            Method::POST,
            "/api/specs/auth/archive",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Precondition failed");

        let (status, body) = get(&state, &format!("/api/approvals/{}/content", record.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "# Requirements\n");

        let (status, body) = send(
            create_app(state.clone()),
            Method::POST,
            &format!("/api/approvals/{}/decision", record.id),
            Some(json!({"decision": "approved", "response": "ship it"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");

        let (status, _) = send(
            create_app(state.clone()),
            Method::POST,
            &format!("/api/approvals/{}/decision", record.id),
            Some(json!({"decision": "rejected", "response": "too late"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            create_app(state.clone()),
            Method::POST,
            "/api/specs/auth/archive",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "archived");

        let (_, body) = get(&state, "/api/specs/archived").await;
        assert_eq!(body[0]["name"], "auth");
    }

    #[tokio::test]
    async fn test_revision_requires_feedback() {
        let (_temp, state) = setup();
        let record = state
            .workflow
            .approvals()
            .create(NewApproval {
                title: "Tasks".to_string(),
                file_path: "tasks.md".to_string(),
                category_name: "auth".to_string(),
                approval_type: ApprovalType::Document,
            })
            .unwrap();
        let uri = format!("/api/approvals/{}/decision", record.id);

        let (status, _) = send(
            create_app(state.clone()),
            Method::POST,
            &uri,
            Some(json!({"decision": "needs-revision"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            create_app(state.clone()),
            Method::POST,
            &uri,
            Some(json!({
                "decision": "needs-revision",
                "comments": [{"type": "selection", "text": "Split this", "startLine": 3, "endLine": 4}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "needs-revision");
        assert_eq!(body["comments"][0]["startLine"], 3);
    }

    #[tokio::test]
    async fn test_unknown_approval_and_spec() {
        let (_temp, state) = setup();
        let (status, body) = get(&state, "/api/approvals/approval_missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["details"].as_str().unwrap().contains("approval_missing"));

        let (status, _) = get(&state, "/api/specs/missing/tasks").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_steering() {
        let (_temp, state) = setup();
        let (status, body) = get(&state, "/api/steering").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exists"], false);

        let (status, _) = get(&state, "/api/steering/tech").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
