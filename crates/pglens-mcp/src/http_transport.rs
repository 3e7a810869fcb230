//! HTTP transport for the MCP server.
//!
//! `POST /mcp` carries one JSON-RPC message per request; `GET /health`
//! reports liveness. Requests are handed to the server over a channel and
//! the response comes back on a per-request channel.

use crate::error::McpError;
use crate::protocol::{INTERNAL_ERROR, JsonRpcRequest, JsonRpcResponse};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

/// A request and where to send its response (`None` for notifications).
pub type RequestSender = mpsc::Sender<(JsonRpcRequest, mpsc::Sender<Option<JsonRpcResponse>>)>;

pub struct HttpTransportState {
    request_tx: RequestSender,
}

impl HttpTransportState {
    pub fn new(request_tx: RequestSender) -> Self {
        Self { request_tx }
    }
}

pub fn create_router(state: Arc<HttpTransportState>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp_post))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_mcp_post(
    State(state): State<Arc<HttpTransportState>>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let id = request.id.clone();
    let (response_tx, mut response_rx) = mpsc::channel(1);

    if state.request_tx.send((request, response_tx)).await.is_err() {
        return unavailable(id, "MCP server unavailable");
    }

    match response_rx.recv().await {
        Some(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Some(None) => StatusCode::ACCEPTED.into_response(),
        None => unavailable(id, "No response from MCP server"),
    }
}

fn unavailable(id: Option<serde_json::Value>, message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(JsonRpcResponse::error(id, INTERNAL_ERROR, message)),
    )
        .into_response()
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pglens",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub struct HttpServer {
    bind_address: String,
    state: Arc<HttpTransportState>,
}

impl HttpServer {
    pub fn new(bind_address: impl Into<String>, request_tx: RequestSender) -> Self {
        Self {
            bind_address: bind_address.into(),
            state: Arc::new(HttpTransportState::new(request_tx)),
        }
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<(), McpError> {
        let app = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .map_err(|e| McpError::StartupFailed(format!("failed to bind to {}: {}", self.bind_address, e)))?;

        tracing::info!(address = %self.bind_address, "MCP HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    /// Router whose backend answers every request with `ok` or, for
    /// notifications, nothing.
    fn echo_router() -> Router {
        let (tx, mut rx): (RequestSender, _) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some((request, response_tx)) = rx.recv().await {
                let response = (!request.is_notification())
                    .then(|| JsonRpcResponse::success(request.id.clone(), json!({"method": request.method})));
                let _ = response_tx.send(response).await;
            }
        });
        create_router(Arc::new(HttpTransportState::new(tx)))
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = echo_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_round_trips_through_server() {
        let response = echo_router()
            .oneshot(post_json(json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["id"], 4);
        assert_eq!(body["result"]["method"], "tools/list");
    }

    #[tokio::test]
    async fn test_notification_is_accepted_without_body() {
        let response = echo_router()
            .oneshot(post_json(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_server_gone() {
        let (tx, rx): (RequestSender, _) = mpsc::channel(1);
        drop(rx);
        let response = create_router(Arc::new(HttpTransportState::new(tx)))
            .oneshot(post_json(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let response = echo_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
