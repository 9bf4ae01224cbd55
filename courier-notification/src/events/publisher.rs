use async_trait::async_trait;

use courier_shared::clients::rabbitmq::{PublishError, RabbitMQClient};
use courier_shared::types::event::{routing_keys, Event};

use crate::delivery::DeliveryRecord;
use crate::services::audit::{AuditError, AuditSink, LogEnvelope};
use crate::services::dispatcher::{DeliveryQueue, QueueError};
use crate::SERVICE_NAME;

impl From<PublishError> for QueueError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Nacked => QueueError::Rejected(err.to_string()),
            PublishError::Encode(_) | PublishError::Broker(_) => {
                QueueError::Unavailable(err.to_string())
            }
        }
    }
}

/// Delivery records on `courier.delivery.{group}`.
#[derive(Clone)]
pub struct RabbitDeliveryQueue {
    rabbitmq: RabbitMQClient,
}

impl RabbitDeliveryQueue {
    pub fn new(rabbitmq: RabbitMQClient) -> Self {
        Self { rabbitmq }
    }
}

#[async_trait]
impl DeliveryQueue for RabbitDeliveryQueue {
    async fn enqueue(&self, record: &DeliveryRecord, group: &str) -> Result<(), QueueError> {
        let routing_key = routing_keys::delivery(group);
        let event = Event::new(SERVICE_NAME, routing_key.as_str(), record)
            .with_user(record.user_id.as_str())
            .with_correlation(record.notification_id);

        self.rabbitmq.publish(&routing_key, &event).await?;
        Ok(())
    }
}

/// Audit envelopes on `courier.audit.log.append`.
#[derive(Clone)]
pub struct RabbitAuditSink {
    rabbitmq: RabbitMQClient,
}

impl RabbitAuditSink {
    pub fn new(rabbitmq: RabbitMQClient) -> Self {
        Self { rabbitmq }
    }
}

#[async_trait]
impl AuditSink for RabbitAuditSink {
    async fn deliver(&self, envelope: LogEnvelope) -> Result<(), AuditError> {
        let event = Event::new(SERVICE_NAME, routing_keys::AUDIT_LOG_APPEND, envelope);

        self.rabbitmq
            .publish(routing_keys::AUDIT_LOG_APPEND, &event)
            .await
            .map_err(|e| AuditError::Sink(e.to_string()))
    }
}
