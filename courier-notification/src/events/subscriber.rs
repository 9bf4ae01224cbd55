use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};

use courier_shared::clients::rabbitmq::{QueueSettings, RabbitMQClient};
use courier_shared::types::event::{routing_keys, Event};

use crate::delivery::DeliveryRecord;
use crate::services::audit::LogEnvelope;
use crate::services::dispatcher::DEFAULT_GROUP;
use crate::AppState;

pub const DELIVERY_QUEUE: &str = "courier-notification.delivery";
const AUDIT_QUEUE: &str = "courier-notification.audit";

/// Reject to the dead-letter queue; never requeue, so one bad record cannot
/// block the FIFO.
async fn reject(delivery: &lapin::message::Delivery) {
    if let Err(e) = delivery
        .nack(BasicNackOptions {
            requeue: false,
            ..Default::default()
        })
        .await
    {
        tracing::error!(error = %e, "failed to nack delivery");
    }
}

async fn ack(delivery: &lapin::message::Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        tracing::error!(error = %e, "failed to ack delivery");
    }
}

/// Consume delivery records one at a time, in queue order.
pub async fn listen_delivery_records(
    rabbitmq: RabbitMQClient,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    let routing_key = routing_keys::delivery(DEFAULT_GROUP);
    let mut consumer = rabbitmq
        .subscribe_with(
            DELIVERY_QUEUE,
            &[routing_key.as_str()],
            QueueSettings {
                prefetch: state.config.consumer_prefetch,
                dead_letter: true,
            },
        )
        .await?;

    tracing::info!("listening for delivery records");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(error = %e, "delivery consumer error");
                continue;
            }
        };

        let event = match serde_json::from_slice::<Event<DeliveryRecord>>(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "failed to deserialize delivery record");
                reject(&delivery).await;
                continue;
            }
        };

        let record = &event.data;
        match state.processor.process(record).await {
            Ok(_) => ack(&delivery).await,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    notification_id = %record.notification_id,
                    channel = %record.channel,
                    "failed to persist delivery record"
                );
                reject(&delivery).await;
            }
        }
    }

    Ok(())
}

/// Consume audit envelopes and append them to the notification log.
pub async fn listen_audit_events(
    rabbitmq: RabbitMQClient,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    let mut consumer = rabbitmq
        .subscribe_with(
            AUDIT_QUEUE,
            &[routing_keys::AUDIT_LOG_APPEND],
            QueueSettings {
                dead_letter: true,
                ..Default::default()
            },
        )
        .await?;

    tracing::info!("listening for audit events");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(error = %e, "audit consumer error");
                continue;
            }
        };

        let event = match serde_json::from_slice::<Event<LogEnvelope>>(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "failed to deserialize audit envelope");
                reject(&delivery).await;
                continue;
            }
        };

        match state.audit_writer.write(&event.data).await {
            Ok(row) => {
                tracing::debug!(
                    notification_id = %row.notification_id,
                    status = %row.status,
                    "audit log row appended"
                );
                ack(&delivery).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to append audit log row");
                reject(&delivery).await;
            }
        }
    }

    Ok(())
}
