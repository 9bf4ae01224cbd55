use async_trait::async_trait;

use courier_shared::clients::rabbitmq::{dead_letter_queue, RabbitMQClient};

use super::subscriber::DELIVERY_QUEUE;
use crate::services::dead_letters::{DeadLetter, DeadLetterError, DeadLetterReader};

/// Dead letters of the delivery consumer, `courier-notification.delivery.dlq`.
#[derive(Clone)]
pub struct RabbitDeadLetters {
    rabbitmq: RabbitMQClient,
    queue: String,
}

impl RabbitDeadLetters {
    pub fn new(rabbitmq: RabbitMQClient) -> Self {
        Self {
            rabbitmq,
            queue: dead_letter_queue(DELIVERY_QUEUE),
        }
    }
}

#[async_trait]
impl DeadLetterReader for RabbitDeadLetters {
    async fn peek(&self, limit: usize) -> Result<Vec<DeadLetter>, DeadLetterError> {
        let messages = self
            .rabbitmq
            .peek(&self.queue, limit)
            .await
            .map_err(|e| DeadLetterError::Unavailable(e.to_string()))?;

        Ok(messages
            .into_iter()
            .map(|m| DeadLetter::from_raw(m.message_id, &m.data))
            .collect())
    }
}
