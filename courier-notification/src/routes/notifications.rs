use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use courier_shared::errors::{AppError, AppResult, ErrorCode};
use courier_shared::types::auth::AuthUser;

use crate::delivery::{self, NotificationRequest};
use crate::services::dispatcher::DispatchReceipt;
use crate::services::transition::{StatusUpdateRequest, TransitionOutcome};
use crate::AppState;

/// The only detail a rejected create request gets back.
const REJECTED: &str = "could not process request";

/// POST /notification
/// Fan a notification out to its channels. Returns one entry per channel key,
/// in request order, even when some enqueues fail.
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    body: Bytes,
) -> AppResult<Json<Vec<DispatchReceipt>>> {
    let plan = serde_json::from_slice::<NotificationRequest>(&body)
        .map_err(|e| e.to_string())
        .and_then(|request| delivery::build(&request).map_err(|e| e.to_string()))
        .map_err(|reason| {
            tracing::warn!(caller = %auth_user.id, reason = %reason, "notification request rejected");
            AppError::new(ErrorCode::RequestRejected, REJECTED)
        })?;

    tracing::info!(
        caller = %auth_user.id,
        notification_id = %plan.notification_id,
        channels = plan.entries.len(),
        "dispatching notification"
    );

    Ok(Json(state.dispatcher.dispatch(&plan).await))
}

/// POST /notification/status
/// Mark a notification read or delete it.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    body: Bytes,
) -> AppResult<Json<TransitionOutcome>> {
    let request: StatusUpdateRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "malformed status update");
        AppError::bad_request("invalid status update payload")
    })?;

    let outcome = state
        .transitions
        .transition_as(&auth_user.id, &request.payload)
        .await?;

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use courier_shared::middleware::{issue_jwt, DEFAULT_JWT_SECRET};
    use courier_shared::types::auth::Claims;

    use crate::delivery::Channel;
    use crate::models::ActiveNotification;
    use crate::services::registry::ConnectionRegistry;
    use crate::test_support::{MemoryQueue, TestApp};

    fn app(test: &TestApp) -> Router {
        crate::router(test.state.clone())
    }

    fn post(uri: &str, user: &str, body: Value) -> Request<Body> {
        let token = issue_jwt(&Claims::new(user, 300), DEFAULT_JWT_SECRET).unwrap();
        Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn seed(test: &TestApp) -> ActiveNotification {
        let row = ActiveNotification::pending(Uuid::new_v4(), "u1", "hi", Utc::now());
        test.active.seed(row.clone());
        row
    }

    fn status_body(id: impl ToString, status: &str) -> Value {
        json!({ "payload": { "notification_id": id.to_string(), "user_id": "u1", "status": status } })
    }

    #[tokio::test]
    async fn create_returns_entry_per_channel() {
        let test = TestApp::new();
        let (status, body) = send(
            app(&test),
            post(
                "/notification",
                "u1",
                json!({
                    "user_id": "u1",
                    "channels": {
                        "in_app": { "message": "hi" },
                        "email": { "message": "hi", "subject": "s", "receiver_email": "a@b.com" }
                    }
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["channel"], "in_app");
        assert_eq!(entries[1]["channel"], "email");
        assert_eq!(entries[0]["notification_id"], entries[1]["notification_id"]);
        assert_eq!(test.queue.messages().len(), 2);
    }

    #[tokio::test]
    async fn create_succeeds_when_an_enqueue_fails() {
        let test = TestApp::with_queue(MemoryQueue::failing_for(Channel::Email));
        let (status, body) = send(
            app(&test),
            post(
                "/notification",
                "u1",
                json!({
                    "user_id": "u1",
                    "channels": { "in_app": { "message": "hi" }, "email": { "message": "hi" } }
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert!(body[1]["notification_id"].is_string());
    }

    #[tokio::test]
    async fn create_rejects_missing_fields_opaquely() {
        let test = TestApp::new();
        let (status, body) = send(
            app(&test),
            post("/notification", "u1", json!({ "channels": { "in_app": { "message": "hi" } } })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "E5002");
        assert_eq!(body["error"]["message"], "could not process request");
        assert!(test.queue.messages().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_unparseable_body() {
        let test = TestApp::new();
        let token = issue_jwt(&Claims::new("u1", 300), DEFAULT_JWT_SECRET).unwrap();
        let request = Request::post("/notification")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from("{not json"))
            .unwrap();

        let (status, _) = send(app(&test), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn requires_bearer_token() {
        let test = TestApp::new();
        let request = Request::post("/notification")
            .body(Body::from(json!({ "user_id": "u1", "channels": {} }).to_string()))
            .unwrap();

        let (status, _) = send(app(&test), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_update_unknown_id_is_404() {
        let test = TestApp::new();
        let (status, body) = send(
            app(&test),
            post("/notification/status", "u1", status_body("X", "read")),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Notification not found");
    }

    #[tokio::test]
    async fn status_update_invalid_status_is_400() {
        let test = TestApp::new();
        let row = seed(&test);

        let (status, _) = send(
            app(&test),
            post(
                "/notification/status",
                "u1",
                status_body(row.notification_id, "archive"),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(test.active.get(row.notification_id).unwrap(), row);
    }

    #[tokio::test]
    async fn status_update_read_pushes_to_live_connection() {
        let test = TestApp::new();
        let row = seed(&test);
        test.registry.register("sid-1", "u1").await.unwrap();

        let (status, body) = send(
            app(&test),
            post("/notification/status", "u1", status_body(row.notification_id, "read")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "read");
        assert_eq!(body["affected"], 1);
        assert_eq!(test.gateway.sent().len(), 1);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(test.audit.envelopes().len(), 1);
        assert!(test.logs.rows().is_empty());
    }

    #[tokio::test]
    async fn delete_then_update_is_404() {
        let test = TestApp::new();
        let row = seed(&test);

        let (status, _) = send(
            app(&test),
            post("/notification/status", "u1", status_body(row.notification_id, "delete")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            app(&test),
            post("/notification/status", "u1", status_body(row.notification_id, "read")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_status_update_is_400() {
        let test = TestApp::new();
        let (status, _) = send(
            app(&test),
            post("/notification/status", "u1", json!({ "notification_id": "X" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_dependencies() {
        let test = TestApp::new();
        let request = Request::get("/health").body(Body::empty()).unwrap();

        let (status, body) = send(app(&test), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"].as_array().unwrap().len(), 2);
    }
}
