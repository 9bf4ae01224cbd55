use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use socketioxide::extract::{AckSender, Data, SocketRef};

use courier_shared::middleware::validate_jwt;
use courier_shared::AppError;

use super::connection_room;
use crate::services::transition::{StatusUpdateRequest, TransitionOutcome};
use crate::AppState;

pub const UPDATE_EVENT: &str = "update_notification";

/// Authenticated user, stored in the socket's extensions.
#[derive(Debug, Clone)]
struct SocketUser(String);

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// Acknowledgement for `update_notification`, shaped like an HTTP response.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocketReply {
    pub status_code: u16,
    pub body: serde_json::Value,
}

pub fn reply_for(result: Result<TransitionOutcome, AppError>) -> SocketReply {
    match result {
        Ok(outcome) => SocketReply {
            status_code: 200,
            body: serde_json::to_value(outcome).unwrap_or_default(),
        },
        Err(err) => {
            let (status, body) = err.render();
            SocketReply {
                status_code: status.as_u16(),
                body: serde_json::to_value(body).unwrap_or_default(),
            }
        }
    }
}

fn get_user_id(socket: &SocketRef) -> Option<String> {
    socket.extensions.get::<SocketUser>().map(|u| u.0)
}

/// `?token=...` from a handshake query string.
pub fn query_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut split = pair.splitn(2, '=');
        let key = split.next()?;
        let value = split.next()?;
        (key == "token" && !value.is_empty()).then(|| value.to_string())
    })
}

fn authenticate_socket(socket: &SocketRef, state: &AppState) -> Result<String, String> {
    let query = socket.req_parts().uri.query().unwrap_or_default();
    let token = query_token(query).ok_or_else(|| "missing token query parameter".to_string())?;
    let claims = validate_jwt(&token, &state.config.jwt_secret).map_err(|e| e.to_string())?;
    Ok(claims.sub)
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, "notification socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    let sid = socket.id.to_string();
    socket.extensions.insert(SocketUser(user_id.clone()));
    socket.join(connection_room(&sid)).ok();

    if let Err(e) = state.registry.register(&sid, &user_id).await {
        tracing::error!(error = %e, user_id = %user_id, sid = %sid, "failed to register connection");
    }

    tracing::info!(user_id = %user_id, sid = %sid, "notification socket connected");

    spawn_heartbeat(socket.clone(), state.clone(), sid, user_id);

    socket.on(UPDATE_EVENT, {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload), ack: AckSender| {
            let state = state.clone();
            async move {
                let reply = on_update_notification(&socket, payload, &state).await;
                ack.send(&reply).ok();
            }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect_with_state(socket, state).await;
            }
        }
    });
}

/// Keep the registry entry alive while the socket stays connected.
fn spawn_heartbeat(socket: SocketRef, state: Arc<AppState>, sid: String, user_id: String) {
    let every = Duration::from_secs((state.config.connection_ttl_secs / 3).max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !socket.connected() {
                break;
            }
            if let Err(e) = state.registry.register(&sid, &user_id).await {
                tracing::warn!(error = %e, sid = %sid, "connection heartbeat failed");
            }
        }
    });
}

async fn on_update_notification(
    socket: &SocketRef,
    payload: serde_json::Value,
    state: &AppState,
) -> SocketReply {
    let Some(caller) = get_user_id(socket) else {
        return reply_for(Err(AppError::unauthorized("socket is not authenticated")));
    };

    let request: StatusUpdateRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, sid = %socket.id, "malformed update_notification payload");
            return reply_for(Err(AppError::bad_request("invalid status update payload")));
        }
    };

    let result = state
        .transitions
        .transition_as(&caller, &request.payload)
        .await
        .map_err(AppError::from);
    reply_for(result)
}

async fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let Some(user_id) = get_user_id(&socket) else {
        return;
    };
    let sid = socket.id.to_string();

    if let Err(e) = state.registry.unregister(&sid).await {
        tracing::warn!(error = %e, sid = %sid, "failed to unregister connection");
    }

    tracing::info!(user_id = %user_id, sid = %sid, "notification socket disconnected");
}
