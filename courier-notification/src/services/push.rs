//! Best-effort live push of state changes to a user's open connection.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use uuid::Uuid;

use super::registry::ConnectionRegistry;
use crate::models::ActiveNotification;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("connection {0} is gone")]
    Stale(String),

    #[error("push transport failed: {0}")]
    Transport(String),
}

/// Event sent over a live connection, tagged by `topic`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic")]
pub enum PushEvent {
    #[serde(rename = "notif_updated")]
    Updated {
        status: String,
        notification_id: Uuid,
    },

    #[serde(rename = "notif_created")]
    Created { notification: ActiveNotification },
}

impl PushEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "notif_updated",
            Self::Created { .. } => "notif_created",
        }
    }
}

/// Transport that can deliver a payload to one connection.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, connection_id: &str, event: &PushEvent) -> Result<(), PushError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    NoConnection,
    Failed,
}

#[derive(Clone)]
pub struct LivePushEmitter {
    registry: Arc<dyn ConnectionRegistry>,
    gateway: Arc<dyn PushGateway>,
}

impl LivePushEmitter {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, gateway: Arc<dyn PushGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Push to a known connection. Never fails; the outcome is for logging.
    pub async fn push(&self, connection_id: Option<&str>, event: &PushEvent) -> PushOutcome {
        let Some(connection_id) = connection_id else {
            counter!("courier_push_skipped_total").increment(1);
            return PushOutcome::NoConnection;
        };

        match self.gateway.send(connection_id, event).await {
            Ok(()) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    topic = event.topic(),
                    "pushed event to live connection"
                );
                PushOutcome::Delivered
            }
            Err(e) => {
                counter!("courier_push_failures_total").increment(1);
                tracing::warn!(
                    error = %e,
                    connection_id = %connection_id,
                    topic = event.topic(),
                    "live push failed"
                );
                PushOutcome::Failed
            }
        }
    }

    /// Resolve the user's live connection, then push.
    pub async fn push_to_user(&self, user_id: &str, event: &PushEvent) -> PushOutcome {
        match self.registry.lookup(user_id).await {
            Ok(connection_id) => self.push(connection_id.as_deref(), event).await,
            Err(e) => {
                counter!("courier_push_failures_total").increment(1);
                tracing::warn!(error = %e, user_id = %user_id, "connection lookup failed");
                PushOutcome::Failed
            }
        }
    }
}
