//! Expiry of audit log rows past their `ttl`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::store::{NotificationLogStore, StoreError};

pub async fn purge_once(logs: &dyn NotificationLogStore) -> Result<usize, StoreError> {
    let purged = logs.purge_expired(Utc::now().timestamp()).await?;
    if purged > 0 {
        tracing::info!(purged, "expired notification logs removed");
    }
    Ok(purged)
}

/// Runs until the task is dropped. Failures are logged and retried on the next tick.
pub async fn run_purge_loop(logs: Arc<dyn NotificationLogStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = purge_once(logs.as_ref()).await {
            tracing::error!(error = %e, "failed to purge expired notification logs");
        }
    }
}
