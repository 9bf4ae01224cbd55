//! Fan-out of a delivery plan onto the durable queue.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use uuid::Uuid;

use crate::delivery::{DeliveryPlan, DeliveryRecord};

/// Every record goes to this single group, which keeps the queue strictly
/// FIFO across all requests.
pub const DEFAULT_GROUP: &str = "default-group";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue rejected message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, record: &DeliveryRecord, group: &str) -> Result<(), QueueError>;
}

/// One response entry per requested channel, in request order.
///
/// `notification_id` is absent for channel keys that produced no record. Its
/// presence does not mean the record was queued; see `enqueued`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReceipt {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip)]
    pub enqueued: bool,
}

#[derive(Clone)]
pub struct FanOutDispatcher {
    queue: Arc<dyn DeliveryQueue>,
}

impl FanOutDispatcher {
    pub fn new(queue: Arc<dyn DeliveryQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue every record concurrently and wait for all of them.
    /// A failed enqueue is logged and keeps its entry.
    pub async fn dispatch(&self, plan: &DeliveryPlan) -> Vec<DispatchReceipt> {
        let sends = plan.entries.iter().map(|entry| async move {
            let Some(record) = entry.record.as_ref() else {
                tracing::warn!(
                    channel = %entry.channel,
                    notification_id = %plan.notification_id,
                    "unsupported channel type, no delivery record produced"
                );
                return DispatchReceipt {
                    channel: entry.channel.clone(),
                    notification_id: None,
                    enqueued: false,
                };
            };

            let enqueued = match self.queue.enqueue(record, DEFAULT_GROUP).await {
                Ok(()) => {
                    tracing::info!(
                        channel = %record.channel,
                        notification_id = %record.notification_id,
                        user_id = %record.user_id,
                        "delivery record queued"
                    );
                    true
                }
                Err(e) => {
                    counter!("courier_enqueue_failures_total", "channel" => record.channel.as_str())
                        .increment(1);
                    tracing::error!(
                        error = %e,
                        channel = %record.channel,
                        notification_id = %record.notification_id,
                        "failed to queue delivery record"
                    );
                    false
                }
            };

            DispatchReceipt {
                channel: entry.channel.clone(),
                notification_id: Some(record.notification_id),
                enqueued,
            }
        });

        join_all(sends).await
    }
}
