use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use courier_shared::clients::db::DbPool;

use super::{ActiveNotificationStore, NotificationLogStore, StoreError};
use crate::models::{ActiveNotification, NotificationLog, NotificationStatus};
use crate::schema::{active_notifications, notification_logs};

/// Run a diesel closure on the blocking pool with a checked-out connection.
async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection");
            StoreError::Pool(e.to_string())
        })?;
        f(&mut conn).map_err(StoreError::from)
    })
    .await?
}

#[derive(Clone)]
pub struct PgActiveNotificationStore {
    pool: DbPool,
}

impl PgActiveNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActiveNotificationStore for PgActiveNotificationStore {
    async fn insert(&self, notification: &ActiveNotification) -> Result<bool, StoreError> {
        let row = notification.clone();
        with_conn(&self.pool, move |conn| {
            diesel::insert_into(active_notifications::table)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(conn)
                .map(|inserted| inserted > 0)
        })
        .await
    }

    async fn find_by_notification_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<ActiveNotification>, StoreError> {
        with_conn(&self.pool, move |conn| {
            active_notifications::table
                .filter(active_notifications::notification_id.eq(notification_id))
                .select(ActiveNotification::as_select())
                .first::<ActiveNotification>(conn)
                .optional()
        })
        .await
    }

    async fn mark_read(&self, user_id: &str, created_at: DateTime<Utc>) -> Result<usize, StoreError> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, move |conn| {
            diesel::update(active_notifications::table.find((user_id, created_at)))
                .set(active_notifications::status.eq(NotificationStatus::Read.as_str()))
                .execute(conn)
        })
        .await
    }

    async fn delete(&self, user_id: &str, created_at: DateTime<Utc>) -> Result<usize, StoreError> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, move |conn| {
            diesel::delete(active_notifications::table.find((user_id, created_at))).execute(conn)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        with_conn(&self.pool, |conn| {
            diesel::sql_query("SELECT 1").execute(conn).map(|_| ())
        })
        .await
    }
}

#[derive(Clone)]
pub struct PgNotificationLogStore {
    pool: DbPool,
}

impl PgNotificationLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLogStore for PgNotificationLogStore {
    async fn append(&self, log: &NotificationLog) -> Result<(), StoreError> {
        let row = log.clone();
        with_conn(&self.pool, move |conn| {
            diesel::insert_into(notification_logs::table)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn statuses(&self, notification_id: Uuid, channel: &str) -> Result<Vec<String>, StoreError> {
        let channel = channel.to_string();
        with_conn(&self.pool, move |conn| {
            notification_logs::table
                .filter(notification_logs::notification_id.eq(notification_id))
                .filter(notification_logs::channel.eq(channel))
                .select(notification_logs::status)
                .distinct()
                .load::<String>(conn)
        })
        .await
    }

    async fn purge_expired(&self, now_epoch: i64) -> Result<usize, StoreError> {
        with_conn(&self.pool, move |conn| {
            diesel::delete(notification_logs::table.filter(notification_logs::ttl.le(now_epoch)))
                .execute(conn)
        })
        .await
    }
}
