//! Live push channel at `GET /ws`.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let hub = state.hub;
    let (id, mut rx) = match hub.connect() {
        Ok(observer) => observer,
        Err(e) => {
            warn!(error = %e, "Could not build initial snapshot");
            return;
        }
    };
    let (mut sink, mut stream) = socket.split();

    let forward_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => hub.handle_client_message(id, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.disconnect(id);
    forward_task.abort();
    debug!(observer = id, "WebSocket closed");
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
