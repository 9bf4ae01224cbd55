use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use courier_shared::errors::AppResult;
use courier_shared::types::auth::AuthUser;

use crate::services::dead_letters::{DeadLetter, MAX_PEEK};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PeekQuery {
    pub limit: Option<usize>,
}

/// GET /dlq
/// Delivery records the consumer rejected, oldest first. Messages stay queued.
pub async fn list(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<PeekQuery>,
) -> AppResult<Json<Vec<DeadLetter>>> {
    let limit = query.limit.unwrap_or(MAX_PEEK).clamp(1, MAX_PEEK);
    let letters = state.dead_letters.peek(limit).await.map_err(|e| {
        tracing::error!(error = %e, caller = %auth_user.id, "failed to read dead letters");
        e
    })?;

    tracing::info!(caller = %auth_user.id, count = letters.len(), "dead letters read");
    Ok(Json(letters))
}
