use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use courier_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::{AppState, SERVICE_NAME};

fn check(name: &str, result: Result<(), String>, failure: HealthStatus) -> HealthCheck {
    match result {
        Ok(()) => HealthCheck {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(message) => HealthCheck {
            name: name.to_string(),
            status: failure,
            message: Some(message),
        },
    }
}

/// Health of the backing stores. Without the registry, pushes are skipped
/// but transitions still succeed, so it only degrades.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let checks = vec![
        check(
            "postgres",
            state.active.ping().await.map_err(|e| e.to_string()),
            HealthStatus::Unhealthy,
        ),
        check(
            "redis",
            state.registry.ping().await.map_err(|e| e.to_string()),
            HealthStatus::Degraded,
        ),
    ];

    let response = HealthResponse::healthy(SERVICE_NAME, env!("CARGO_PKG_VERSION"))
        .with_checks(checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
