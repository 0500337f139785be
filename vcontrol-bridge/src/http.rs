//! HTTP server for the liveness and readiness endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::health::{HealthState, HealthStatus};

/// Body of `/health/ready`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyBody {
    status: HealthStatus,
    last_success: bool,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_exit_code: Option<i32>,
    last_error: Option<String>,
}

/// Create the HTTP router.
fn create_router(health: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health/live", get(live_handler))
        .route("/health/ready", get(ready_handler))
        .with_state(health)
}

/// Handler for `/health/live`: the process is up.
async fn live_handler() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "Live" }))).into_response()
}

/// Handler for `/health/ready`: 200 when the last poll succeeded (or none
/// ran yet), 503 after a failure.
async fn ready_handler(State(health): State<Arc<HealthState>>) -> Response {
    let snapshot = health.snapshot();
    let status = snapshot.status();

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = ReadyBody {
        status,
        last_success: snapshot.last_success,
        last_success_at: snapshot.last_success_at,
        last_failure_at: snapshot.last_failure_at,
        last_exit_code: snapshot.last_exit_code,
        last_error: snapshot.last_error,
    };

    (code, Json(body)).into_response()
}

/// Health endpoint server.
pub struct HttpServer {
    health: Arc<HealthState>,
    listen_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(health: Arc<HealthState>, listen_addr: SocketAddr) -> Self {
        Self {
            health,
            listen_addr,
        }
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = create_router(self.health);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "Health endpoints listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(router: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_live_endpoint() {
        let router = create_router(Arc::new(HealthState::new()));
        let (status, body) = get_json(router, "/health/live").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "Live" }));
    }

    #[tokio::test]
    async fn test_ready_before_first_poll() {
        let router = create_router(Arc::new(HealthState::new()));
        let (status, body) = get_json(router, "/health/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Healthy");
        assert_eq!(body["lastSuccess"], false);
        assert!(body["lastExitCode"].is_null());
    }

    #[tokio::test]
    async fn test_ready_after_success() {
        let health = Arc::new(HealthState::new());
        health.report_success(0, None);

        let (status, body) = get_json(create_router(health), "/health/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Healthy");
        assert_eq!(body["lastSuccess"], true);
        assert_eq!(body["lastExitCode"], 0);
        assert!(body["lastSuccessAt"].is_string());
        assert!(body["lastError"].is_null());
    }

    #[tokio::test]
    async fn test_ready_after_failure() {
        let health = Arc::new(HealthState::new());
        health.report_failure(2, Some("disconnected"));

        let (status, body) = get_json(create_router(health), "/health/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "Degraded");
        assert_eq!(body["lastSuccess"], false);
        assert_eq!(body["lastExitCode"], 2);
        assert_eq!(body["lastError"], "disconnected");
        assert!(body["lastFailureAt"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let router = create_router(Arc::new(HealthState::new()));
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let server = HttpServer::new(
            Arc::new(HealthState::new()),
            SocketAddr::from(([127, 0, 0, 1], 0)),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(5), server.run(shutdown)).await;
        assert!(result.expect("server did not stop").is_ok());
    }
}
