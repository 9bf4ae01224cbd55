//! Downstream consumer side of the delivery queue: persists and delivers one
//! [`DeliveryRecord`] at a time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use uuid::Uuid;

use super::channels::{ChannelError, ChannelSender};
use super::push::{LivePushEmitter, PushEvent};
use crate::delivery::{Channel, DeliveryRecord};
use crate::models::{ActiveNotification, LogStatus, NotificationLog};
use crate::store::{ActiveNotificationStore, NotificationLogStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    /// Already settled by an earlier delivery of the same record.
    Duplicate,
}

#[derive(Clone)]
pub struct DeliveryProcessor {
    active: Arc<dyn ActiveNotificationStore>,
    logs: Arc<dyn NotificationLogStore>,
    sender: Arc<dyn ChannelSender>,
    push: LivePushEmitter,
    log_ttl: Duration,
}

impl DeliveryProcessor {
    pub fn new(
        active: Arc<dyn ActiveNotificationStore>,
        logs: Arc<dyn NotificationLogStore>,
        sender: Arc<dyn ChannelSender>,
        push: LivePushEmitter,
        log_ttl: Duration,
    ) -> Self {
        Self {
            active,
            logs,
            sender,
            push,
            log_ttl,
        }
    }

    fn log_row(&self, record: &DeliveryRecord, status: LogStatus, now: DateTime<Utc>) -> NotificationLog {
        NotificationLog {
            log_id: Uuid::new_v4(),
            notification_id: record.notification_id,
            user_id: record.user_id.clone(),
            created_at: now,
            channel: record.channel.as_str().to_string(),
            message: record.body.message.clone(),
            receiver_email: record.body.receiver_email.clone(),
            subject: record.body.subject.clone(),
            slack: record.body.slack.clone(),
            status: status.as_str().to_string(),
            ttl: (now + self.log_ttl).timestamp(),
        }
    }

    /// A store error means the record was not durably handled and must not be
    /// acknowledged. Channel delivery failures are recorded and acknowledged.
    ///
    /// The queue delivers at least once, so a record may arrive again after a
    /// crash or a nack. A record whose `sent` or `failed` row exists is skipped;
    /// one that stopped part way resumes without a second `created` row.
    pub async fn process(&self, record: &DeliveryRecord) -> Result<DeliveryOutcome, StoreError> {
        let seen = self
            .logs
            .statuses(record.notification_id, record.channel.as_str())
            .await?;
        let settled = [LogStatus::Sent, LogStatus::Failed]
            .iter()
            .any(|s| seen.iter().any(|v| v == s.as_str()));
        if settled {
            tracing::debug!(
                notification_id = %record.notification_id,
                channel = %record.channel,
                "delivery record already settled"
            );
            counter!(
                "courier_deliveries_total",
                "channel" => record.channel.as_str(),
                "outcome" => "duplicate"
            )
            .increment(1);
            return Ok(DeliveryOutcome::Duplicate);
        }

        if !seen.iter().any(|v| v == LogStatus::Created.as_str()) {
            self.logs
                .append(&self.log_row(record, LogStatus::Created, Utc::now()))
                .await?;
        }

        let outcome = match self.deliver(record).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(DeliverError::Store(e)) => return Err(e),
            Err(DeliverError::Channel(e)) => {
                tracing::warn!(
                    error = %e,
                    notification_id = %record.notification_id,
                    channel = %record.channel,
                    "channel delivery failed"
                );
                DeliveryOutcome::Failed
            }
        };

        let status = match outcome {
            DeliveryOutcome::Failed => LogStatus::Failed,
            _ => LogStatus::Sent,
        };
        self.logs
            .append(&self.log_row(record, status, Utc::now()))
            .await?;

        counter!(
            "courier_deliveries_total",
            "channel" => record.channel.as_str(),
            "outcome" => status.as_str()
        )
        .increment(1);

        tracing::info!(
            notification_id = %record.notification_id,
            user_id = %record.user_id,
            channel = %record.channel,
            status = status.as_str(),
            "delivery record processed"
        );

        Ok(outcome)
    }

    async fn deliver(&self, record: &DeliveryRecord) -> Result<(), DeliverError> {
        let body = &record.body;
        match record.channel {
            Channel::InApp => {
                let notification = ActiveNotification::pending(
                    record.notification_id,
                    &record.user_id,
                    &body.message,
                    Utc::now(),
                );
                if !self.active.insert(&notification).await? {
                    // Row survived an earlier attempt; its push already went out.
                    return Ok(());
                }

                let user_id = notification.user_id.clone();
                self.push
                    .push_to_user(&user_id, &PushEvent::Created { notification })
                    .await;
                Ok(())
            }
            Channel::Email => Ok(self
                .sender
                .send_email(
                    body.receiver_email.as_deref(),
                    body.subject.as_deref(),
                    &body.message,
                )
                .await?),
            Channel::Slack => match body.slack.as_deref() {
                Some(webhook) => Ok(self.sender.send_slack(webhook, &body.message).await?),
                None => Err(DeliverError::Channel(ChannelError::MissingWebhook)),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum DeliverError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
