use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{active_notifications, notification_logs};

/// Lifecycle of a row in the active projection. Deletion removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status recorded on an audit log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Created,
    Sent,
    Failed,
    Read,
    Deleted,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Read => "read",
            Self::Deleted => "deleted",
        }
    }
}

/// What a connected client currently sees as pending or read.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = active_notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActiveNotification {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub notification_id: Uuid,
    pub message: String,
    pub status: String,
}

impl ActiveNotification {
    pub fn pending(notification_id: Uuid, user_id: &str, message: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            created_at,
            notification_id,
            message: message.to_string(),
            status: NotificationStatus::Pending.as_str().to_string(),
        }
    }
}

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = notification_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationLog {
    pub log_id: Uuid,
    pub notification_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub channel: String,
    pub message: String,
    pub receiver_email: Option<String>,
    pub subject: Option<String>,
    pub slack: Option<String>,
    pub status: String,
    /// Expiry as a unix epoch in seconds.
    pub ttl: i64,
}
