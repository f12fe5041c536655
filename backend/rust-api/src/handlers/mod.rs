use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

pub mod admin;
pub mod appointments;
pub mod auth;
pub mod consultations;
pub mod dashboard;
pub mod error;
pub mod first_aid;
pub mod messages;
pub mod prescriptions;
pub mod profiles;

pub use error::{ApiError, ApiResult};

const METRICS_AUTH_DEFAULT: &str = "admin:changeme";

/// GET /health - MongoDB and Redis reachability, 503 when either is down
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mongo = probe("MongoDB", Duration::from_secs(1), async {
        state
            .mongo
            .run_command(mongodb::bson::doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .await;

    let mut conn = state.redis.clone();
    let redis = probe("Redis", Duration::from_millis(500), async {
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .await;

    let healthy = mongo["status"] == "healthy" && redis["status"] == "healthy";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "service": "telesoins-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": { "mongodb": mongo, "redis": redis },
        })),
    )
}

async fn probe<F>(name: &str, limit: Duration, check: F) -> Value
where
    F: Future<Output = Result<(), String>>,
{
    match tokio::time::timeout(limit, check).await {
        Ok(Ok(())) => json!({
            "status": "healthy",
            "message": format!("{} connection successful", name),
        }),
        Ok(Err(e)) => json!({
            "status": "unhealthy",
            "error": format!("{} error: {}", name, e),
        }),
        Err(_) => json!({
            "status": "unhealthy",
            "error": format!("{} timeout after {}ms", name, limit.as_millis()),
        }),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic auth in front of /metrics. Credentials come from `METRICS_AUTH` (`user:password`).
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(basic_credentials)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let expected =
        std::env::var("METRICS_AUTH").unwrap_or_else(|_| METRICS_AUTH_DEFAULT.to_string());
    if credentials != expected {
        tracing::warn!("Rejected /metrics request with invalid credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn basic_credentials(header_value: &str) -> Option<String> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_are_decoded() {
        let header_value = format!("Basic {}", general_purpose::STANDARD.encode("ops:secret"));
        assert_eq!(basic_credentials(&header_value).as_deref(), Some("ops:secret"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert_eq!(basic_credentials("Bearer abc"), None);
        assert_eq!(basic_credentials("Basic !!!"), None);
    }

    #[tokio::test]
    async fn probe_reports_timeouts() {
        let status = probe("Slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert_eq!(status["status"], "unhealthy");
        assert_eq!(status["error"], "Slow timeout after 5ms");
    }
}
