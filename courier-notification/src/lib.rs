use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod delivery;
pub mod events;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod socket;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

use crate::config::AppConfig;
use crate::services::audit::AuditWriter;
use crate::services::dead_letters::DeadLetterReader;
use crate::services::dispatcher::FanOutDispatcher;
use crate::services::processor::DeliveryProcessor;
use crate::services::registry::ConnectionRegistry;
use crate::services::transition::TransitionEngine;
use crate::store::{ActiveNotificationStore, NotificationLogStore};

pub const SERVICE_NAME: &str = "courier-notification";

/// Process-wide components, built once at start-up and shared by the HTTP
/// routes, socket handlers and queue consumers.
pub struct AppState {
    pub config: AppConfig,
    pub dispatcher: FanOutDispatcher,
    pub transitions: TransitionEngine,
    pub processor: DeliveryProcessor,
    pub audit_writer: AuditWriter,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub active: Arc<dyn ActiveNotificationStore>,
    pub logs: Arc<dyn NotificationLogStore>,
    pub dead_letters: Arc<dyn DeadLetterReader>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/notification", post(routes::notifications::create_notification))
        .route("/notification/status", post(routes::notifications::update_status))
        .route("/dlq", get(routes::dead_letters::list))
        .layer(axum::middleware::from_fn(
            courier_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
