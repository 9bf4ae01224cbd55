//! Out-of-band audit logging of status transitions.
//!
//! The transition engine hands an [`AuditRecord`] to [`AuditLogger::append`],
//! which returns immediately and ships the record on a background task. On the
//! wire the record travels inside a request-shaped [`LogEnvelope`]
//! (`{"requestContext":{"http":{"method":"POST"}},"body":"<json>"}`) so that
//! existing log writers keep accepting it. [`AuditWriter`] is the receiving
//! end that turns an envelope into a log row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::delivery::Channel;
use crate::models::{LogStatus, NotificationLog};
use crate::store::{NotificationLogStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("could not encode audit envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unsupported envelope method: {0}")]
    UnsupportedMethod(String),

    #[error("audit sink failed: {0}")]
    Sink(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of one transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub status: String,
    pub user_id: String,
    pub message: String,
    pub notification_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpContext {
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub http: HttpContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEnvelope {
    pub request_context: RequestContext,
    /// JSON-encoded [`AuditRecord`].
    pub body: String,
}

impl LogEnvelope {
    pub fn post(record: &AuditRecord) -> Result<Self, AuditError> {
        Ok(Self {
            request_context: RequestContext {
                http: HttpContext {
                    method: "POST".to_string(),
                },
            },
            body: serde_json::to_string(record)?,
        })
    }

    pub fn record(&self) -> Result<AuditRecord, AuditError> {
        if self.request_context.http.method != "POST" {
            return Err(AuditError::UnsupportedMethod(
                self.request_context.http.method.clone(),
            ));
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Where envelopes go once they leave the request path.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn deliver(&self, envelope: LogEnvelope) -> Result<(), AuditError>;
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Fire-and-forget. Failures are logged and counted, never returned.
    /// The handle is only awaited by callers that need to observe completion.
    pub fn append(&self, record: AuditRecord) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let notification_id = record.notification_id;
            let result = match LogEnvelope::post(&record) {
                Ok(envelope) => sink.deliver(envelope).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => tracing::debug!(notification_id = %notification_id, "audit record sent"),
                Err(e) => {
                    counter!("courier_audit_failures_total").increment(1);
                    tracing::error!(
                        error = %e,
                        notification_id = %notification_id,
                        "failed to send audit record"
                    );
                }
            }
        })
    }
}

/// Log status for a transition target as named on the wire.
fn log_status(status: &str) -> String {
    match status {
        "read" => LogStatus::Read.as_str().to_string(),
        "delete" | "deleted" => LogStatus::Deleted.as_str().to_string(),
        other => other.to_string(),
    }
}

/// Receiving side: unwraps envelopes into log rows.
#[derive(Clone)]
pub struct AuditWriter {
    logs: Arc<dyn NotificationLogStore>,
    ttl: Duration,
}

impl AuditWriter {
    pub fn new(logs: Arc<dyn NotificationLogStore>, ttl: Duration) -> Self {
        Self { logs, ttl }
    }

    pub fn log_row(&self, record: &AuditRecord, now: DateTime<Utc>) -> NotificationLog {
        NotificationLog {
            log_id: Uuid::new_v4(),
            notification_id: record.notification_id,
            user_id: record.user_id.clone(),
            created_at: now,
            channel: Channel::InApp.as_str().to_string(),
            message: record.message.clone(),
            receiver_email: None,
            subject: None,
            slack: None,
            status: log_status(&record.status),
            ttl: (now + self.ttl).timestamp(),
        }
    }

    pub async fn write(&self, envelope: &LogEnvelope) -> Result<NotificationLog, AuditError> {
        let record = envelope.record()?;
        let row = self.log_row(&record, Utc::now());
        self.logs.append(&row).await?;
        Ok(row)
    }
}
