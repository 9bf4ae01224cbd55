//! Read-only view of delivery records the consumer gave up on.

use async_trait::async_trait;
use serde::Serialize;

use courier_shared::AppError;

/// Most messages returned by one read.
pub const MAX_PEEK: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub message_id: Option<String>,
    pub body: serde_json::Value,
}

impl DeadLetter {
    /// Keep the raw payload visible even when it is not JSON; malformed
    /// records are one of the reasons a message lands here.
    pub fn from_raw(message_id: Option<String>, data: &[u8]) -> Self {
        let body = serde_json::from_slice(data)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(data).into_owned()));
        Self { message_id, body }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeadLetterError {
    #[error("dead-letter queue unavailable: {0}")]
    Unavailable(String),
}

impl From<DeadLetterError> for AppError {
    fn from(err: DeadLetterError) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait DeadLetterReader: Send + Sync {
    /// Up to `limit` messages from the head of the queue, left in place.
    async fn peek(&self, limit: usize) -> Result<Vec<DeadLetter>, DeadLetterError>;
}
