//! Storage contracts for the active projection and the audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ActiveNotification, NotificationLog};

pub mod postgres;

pub use postgres::{PgActiveNotificationStore, PgNotificationLogStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The mutable "currently visible" projection, keyed by `(user_id, created_at)`
/// with a secondary lookup by `notification_id`.
#[async_trait]
pub trait ActiveNotificationStore: Send + Sync {
    /// Insert unless a row with the same key or `notification_id` exists.
    /// Returns whether a row was written.
    async fn insert(&self, notification: &ActiveNotification) -> Result<bool, StoreError>;

    /// At most one row carrying this id.
    async fn find_by_notification_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<ActiveNotification>, StoreError>;

    /// Set `status = read` on the keyed row. Returns the number of rows changed.
    async fn mark_read(&self, user_id: &str, created_at: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Remove the keyed row. Returns the number of rows removed.
    async fn delete(&self, user_id: &str, created_at: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Append-only audit trail. Rows leave only through TTL expiry.
#[async_trait]
pub trait NotificationLogStore: Send + Sync {
    /// Delivery rows (`created`, `sent`, `failed`) are unique per
    /// `(notification_id, channel, status)`; a repeated one is dropped.
    async fn append(&self, log: &NotificationLog) -> Result<(), StoreError>;

    /// Statuses already logged for one channel of a notification.
    async fn statuses(&self, notification_id: Uuid, channel: &str) -> Result<Vec<String>, StoreError>;

    /// Delete rows whose `ttl` is at or before `now_epoch`.
    async fn purge_expired(&self, now_epoch: i64) -> Result<usize, StoreError>;
}
