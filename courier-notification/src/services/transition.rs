//! Status transitions on the active projection: `pending -> read`, and
//! `pending | read -> deleted` (row removed).

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_shared::{AppError, ErrorCode};

use super::audit::{AuditLogger, AuditRecord};
use super::push::{LivePushEmitter, PushEvent};
use crate::store::{ActiveNotificationStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionTarget {
    Read,
    Delete,
}

impl TransitionTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatusUpdate {
    pub notification_id: String,
    pub user_id: String,
    pub status: String,
}

/// Body of Ingress B, over HTTP or the socket.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub payload: StatusUpdate,
}

/// Result of the store mutation, returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub notification_id: Uuid,
    pub user_id: String,
    pub status: String,
    pub affected: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Notification not found")]
    NotFound,

    #[error("Invalid status.")]
    InvalidStatus(String),

    #[error("store mutation failed: {0}")]
    Store(#[from] StoreError),
}

impl TransitionError {
    fn outcome_label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidStatus(_) => "invalid_status",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotFound => {
                AppError::new(ErrorCode::NotificationNotFound, "Notification not found")
            }
            TransitionError::InvalidStatus(status) => AppError::with_details(
                ErrorCode::InvalidStatus,
                "Invalid status.",
                serde_json::json!({ "status": status }),
            ),
            TransitionError::Store(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

#[derive(Clone)]
pub struct TransitionEngine {
    store: Arc<dyn ActiveNotificationStore>,
    push: LivePushEmitter,
    audit: AuditLogger,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn ActiveNotificationStore>,
        push: LivePushEmitter,
        audit: AuditLogger,
    ) -> Self {
        Self { store, push, audit }
    }

    /// Apply a transition. Push and audit run only after a successful
    /// mutation and never affect the result.
    pub async fn transition(&self, update: &StatusUpdate) -> Result<TransitionOutcome, TransitionError> {
        let result = self.apply(update).await;

        let (status, outcome) = match &result {
            Ok(o) => (o.status.clone(), "ok"),
            Err(e) => (update.status.clone(), e.outcome_label()),
        };
        counter!("courier_transitions_total", "status" => status, "outcome" => outcome).increment(1);

        result
    }

    /// Transition on behalf of an authenticated caller, who may only touch
    /// their own notifications.
    pub async fn transition_as(
        &self,
        caller: &str,
        update: &StatusUpdate,
    ) -> Result<TransitionOutcome, TransitionError> {
        if update.user_id != caller {
            tracing::warn!(
                caller = %caller,
                user_id = %update.user_id,
                "status update for another user rejected"
            );
            return Err(TransitionError::NotFound);
        }
        self.transition(update).await
    }

    async fn apply(&self, update: &StatusUpdate) -> Result<TransitionOutcome, TransitionError> {
        let notification_id =
            Uuid::parse_str(&update.notification_id).map_err(|_| TransitionError::NotFound)?;

        let row = self
            .store
            .find_by_notification_id(notification_id)
            .await?
            .filter(|row| row.user_id == update.user_id)
            .ok_or(TransitionError::NotFound)?;

        let Some(target) = TransitionTarget::parse(&update.status) else {
            tracing::warn!(
                notification_id = %notification_id,
                user_id = %update.user_id,
                status = %update.status,
                "rejected transition to unsupported status"
            );
            return Err(TransitionError::InvalidStatus(update.status.clone()));
        };

        let affected = match target {
            TransitionTarget::Read => self.store.mark_read(&row.user_id, row.created_at).await,
            TransitionTarget::Delete => self.store.delete(&row.user_id, row.created_at).await,
        }
        .map_err(|e| {
            tracing::error!(
                error = %e,
                notification_id = %notification_id,
                status = target.as_str(),
                "status mutation failed"
            );
            e
        })?;

        // Lost the race against a concurrent delete.
        if affected == 0 {
            return Err(TransitionError::NotFound);
        }

        tracing::info!(
            notification_id = %notification_id,
            user_id = %row.user_id,
            status = target.as_str(),
            "notification status changed"
        );

        let event = PushEvent::Updated {
            status: target.as_str().to_string(),
            notification_id,
        };
        self.push.push_to_user(&row.user_id, &event).await;

        self.audit.append(AuditRecord {
            status: target.as_str().to_string(),
            user_id: row.user_id.clone(),
            message: row.message.clone(),
            notification_id,
        });

        Ok(TransitionOutcome {
            notification_id,
            user_id: row.user_id,
            status: target.as_str().to_string(),
            affected,
        })
    }
}
