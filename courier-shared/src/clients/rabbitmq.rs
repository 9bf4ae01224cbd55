use std::sync::Arc;

use lapin::{
    options::*,
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, LongString},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use serde::Serialize;

use crate::types::Event;

const EXCHANGE_NAME: &str = "courier.events";
const DEAD_LETTER_EXCHANGE: &str = "courier.dlx";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("broker did not accept the message")]
    Nacked,
}

/// Only a broker ack means the message is durably queued.
fn check_confirmation(confirmation: Confirmation) -> Result<(), PublishError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) | Confirmation::NotRequested => Err(PublishError::Nacked),
    }
}

/// Name of the queue that collects rejected deliveries of `queue_name`.
pub fn dead_letter_queue(queue_name: &str) -> String {
    format!("{queue_name}.dlq")
}

/// A message read without being consumed.
#[derive(Debug, Clone)]
pub struct PeekedMessage {
    pub message_id: Option<String>,
    pub data: Vec<u8>,
}

/// How a subscription's queue is declared and consumed.
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// Unacknowledged deliveries allowed in flight. `1` keeps strict FIFO.
    pub prefetch: u16,
    /// Route rejected deliveries to `{queue}.dlq` through the dead-letter exchange.
    pub dead_letter: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            prefetch: 10,
            dead_letter: false,
        }
    }
}

#[derive(Clone)]
pub struct RabbitMQClient {
    connection: Arc<Connection>,
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        // Declare the topic exchange
        channel
            .exchange_declare(
                EXCHANGE_NAME,
                lapin::ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .exchange_declare(
                DEAD_LETTER_EXCHANGE,
                lapin::ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(url = %url, "connected to RabbitMQ");
        Ok(Self {
            connection: Arc::new(conn),
            channel,
        })
    }

    /// Publish an event with a routing key and wait for the broker confirm.
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: &str,
        event: &Event<T>,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        let confirmation = self
            .channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_message_id(event.id.to_string().into())
                    .with_delivery_mode(2), // persistent
            )
            .await?
            .await?;
        check_confirmation(confirmation)?;

        tracing::debug!(
            routing_key = %routing_key,
            event_id = %event.id,
            "event published"
        );

        Ok(())
    }

    /// Read up to `limit` messages from the head of a queue and leave them
    /// there. The messages are fetched unacked on a throwaway channel; closing
    /// it hands them back to the broker in their original order.
    pub async fn peek(&self, queue_name: &str, limit: usize) -> Result<Vec<PeekedMessage>, lapin::Error> {
        let channel = self.connection.create_channel().await?;
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let mut messages = Vec::new();
        while messages.len() < limit {
            let Some(message) = channel
                .basic_get(queue_name, BasicGetOptions { no_ack: false })
                .await?
            else {
                break;
            };
            let delivery = message.delivery;
            messages.push(PeekedMessage {
                message_id: delivery
                    .properties
                    .message_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                data: delivery.data,
            });
        }

        channel.close(200, "peek done").await?;
        tracing::debug!(queue = %queue_name, count = messages.len(), "peeked queue");
        Ok(messages)
    }

    /// Declare a queue on its own channel, bind it, and start consuming.
    pub async fn subscribe_with(
        &self,
        queue_name: &str,
        routing_keys: &[&str],
        settings: QueueSettings,
    ) -> Result<Consumer, lapin::Error> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(settings.prefetch, BasicQosOptions::default())
            .await?;

        let mut arguments = FieldTable::default();
        if settings.dead_letter {
            let dlq_name = dead_letter_queue(queue_name);
            channel
                .queue_declare(
                    &dlq_name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            channel
                .queue_bind(
                    &dlq_name,
                    DEAD_LETTER_EXCHANGE,
                    queue_name,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(LongString::from(DEAD_LETTER_EXCHANGE)),
            );
            arguments.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(LongString::from(queue_name)),
            );
        }

        // Declare durable queue
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await?;

        // Bind queue to each routing key
        for key in routing_keys {
            channel
                .queue_bind(
                    queue_name,
                    EXCHANGE_NAME,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        // Start consuming
        let consumer = channel
            .basic_consume(
                queue_name,
                &format!("{queue_name}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            queue = %queue_name,
            bindings = ?routing_keys,
            prefetch = settings.prefetch,
            dead_letter = settings.dead_letter,
            "subscribed to RabbitMQ queue"
        );

        Ok(consumer)
    }
}
