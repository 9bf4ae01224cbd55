//! In-memory stand-ins for every external contract, with failure switches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::delivery::{Channel, DeliveryRecord};
use crate::models::{ActiveNotification, NotificationLog, NotificationStatus};
use crate::services::audit::{AuditError, AuditLogger, AuditSink, AuditWriter, LogEnvelope};
use crate::services::channels::{checked_recipient, ChannelError, ChannelSender};
use crate::services::dead_letters::{DeadLetter, DeadLetterError, DeadLetterReader};
use crate::services::dispatcher::{DeliveryQueue, FanOutDispatcher, QueueError};
use crate::services::processor::DeliveryProcessor;
use crate::services::push::{LivePushEmitter, PushError, PushEvent, PushGateway};
use crate::services::registry::{ConnectionRegistry, RegistryError};
use crate::services::transition::TransitionEngine;
use crate::store::{ActiveNotificationStore, NotificationLogStore, StoreError};
use crate::AppState;

fn unavailable() -> StoreError {
    StoreError::Pool("store offline".into())
}

#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<(DeliveryRecord, String)>>,
    failing: Option<Channel>,
}

impl MemoryQueue {
    pub fn failing_for(channel: Channel) -> Self {
        Self {
            failing: Some(channel),
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<(DeliveryRecord, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryQueue for MemoryQueue {
    async fn enqueue(&self, record: &DeliveryRecord, group: &str) -> Result<(), QueueError> {
        if self.failing == Some(record.channel) {
            return Err(QueueError::Rejected("broker refused".into()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((record.clone(), group.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryActiveStore {
    rows: Mutex<HashMap<(String, DateTime<Utc>), ActiveNotification>>,
    fail_mutations: AtomicBool,
    vanish_after_lookup: AtomicBool,
}

impl MemoryActiveStore {
    pub fn seed(&self, row: ActiveNotification) {
        self.rows
            .lock()
            .unwrap()
            .insert((row.user_id.clone(), row.created_at), row);
    }

    pub fn get(&self, notification_id: Uuid) -> Option<ActiveNotification> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.notification_id == notification_id)
            .cloned()
    }

    /// Lookups keep working; inserts, updates and deletes fail.
    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail_mutations.store(false, Ordering::SeqCst);
    }

    /// The next lookup returns the row, then the row is gone, as if a
    /// concurrent delete landed between read and write.
    pub fn vanish_after_lookup(&self) {
        self.vanish_after_lookup.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ActiveNotificationStore for MemoryActiveStore {
    async fn insert(&self, notification: &ActiveNotification) -> Result<bool, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let key = (notification.user_id.clone(), notification.created_at);
        let taken = rows.contains_key(&key)
            || rows
                .values()
                .any(|r| r.notification_id == notification.notification_id);
        if taken {
            return Ok(false);
        }
        rows.insert(key, notification.clone());
        Ok(true)
    }

    async fn find_by_notification_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<ActiveNotification>, StoreError> {
        let found = self.get(notification_id);
        if let Some(row) = &found {
            if self.vanish_after_lookup.swap(false, Ordering::SeqCst) {
                self.rows
                    .lock()
                    .unwrap()
                    .remove(&(row.user_id.clone(), row.created_at));
            }
        }
        Ok(found)
    }

    async fn mark_read(&self, user_id: &str, created_at: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&(user_id.to_string(), created_at)) {
            Some(row) => {
                row.status = NotificationStatus::Read.as_str().to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, user_id: &str, created_at: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check()?;
        let removed = self
            .rows
            .lock()
            .unwrap()
            .remove(&(user_id.to_string(), created_at));
        Ok(usize::from(removed.is_some()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLogStore {
    rows: Mutex<Vec<NotificationLog>>,
}

impl MemoryLogStore {
    pub fn rows(&self) -> Vec<NotificationLog> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationLogStore for MemoryLogStore {
    async fn append(&self, log: &NotificationLog) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let delivery_status = matches!(log.status.as_str(), "created" | "sent" | "failed");
        let exists = rows.iter().any(|r| {
            r.notification_id == log.notification_id
                && r.channel == log.channel
                && r.status == log.status
        });
        if !(delivery_status && exists) {
            rows.push(log.clone());
        }
        Ok(())
    }

    async fn statuses(&self, notification_id: Uuid, channel: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.notification_id == notification_id && r.channel == channel)
            .map(|r| r.status.clone())
            .collect())
    }

    async fn purge_expired(&self, now_epoch: i64) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.ttl > now_epoch);
        Ok(before - rows.len())
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    connections: Mutex<HashMap<String, String>>,
    down: bool,
}

impl MemoryRegistry {
    pub fn unavailable() -> Self {
        Self {
            down: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.down {
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "registry down")).into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryRegistry {
    async fn register(&self, connection_id: &str, user_id: &str) -> Result<(), RegistryError> {
        self.check()?;
        self.connections
            .lock()
            .unwrap()
            .insert(connection_id.to_string(), user_id.to_string());
        Ok(())
    }

    async fn unregister(&self, connection_id: &str) -> Result<(), RegistryError> {
        self.check()?;
        self.connections.lock().unwrap().remove(connection_id);
        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<String>, RegistryError> {
        self.check()?;
        Ok(self
            .connections
            .lock()
            .unwrap()
            .iter()
            .find(|(_, owner)| owner.as_str() == user_id)
            .map(|(sid, _)| sid.clone()))
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.check()
    }
}

#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(String, PushEvent)>>,
    failing: bool,
}

impl RecordingGateway {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, PushEvent)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, connection_id: &str, event: &PushEvent) -> Result<(), PushError> {
        if self.failing {
            return Err(PushError::Stale(connection_id.to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((connection_id.to_string(), event.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    envelopes: Mutex<Vec<LogEnvelope>>,
    failing: bool,
}

impl RecordingAuditSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn envelopes(&self) -> Vec<LogEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn deliver(&self, envelope: LogEnvelope) -> Result<(), AuditError> {
        if self.failing {
            return Err(AuditError::Sink("sink offline".into()));
        }
        self.envelopes.lock().unwrap().push(envelope);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChannelSender {
    emails: Mutex<Vec<(String, String, String)>>,
    slack_posts: Mutex<Vec<(String, String)>>,
    failing: bool,
}

impl RecordingChannelSender {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn emails(&self) -> Vec<(String, String, String)> {
        self.emails.lock().unwrap().clone()
    }

    pub fn slack_posts(&self) -> Vec<(String, String)> {
        self.slack_posts.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), ChannelError> {
        if self.failing {
            Err(ChannelError::Email(
                courier_shared::clients::email::EmailError::Api {
                    status: 503,
                    body: "unavailable".into(),
                },
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChannelSender for RecordingChannelSender {
    async fn send_email(
        &self,
        receiver_email: Option<&str>,
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), ChannelError> {
        let to = checked_recipient(receiver_email)?;
        self.check()?;
        self.emails.lock().unwrap().push((
            to.to_string(),
            subject.unwrap_or_default().to_string(),
            message.to_string(),
        ));
        Ok(())
    }

    async fn send_slack(&self, webhook_url: &str, message: &str) -> Result<(), ChannelError> {
        self.check()?;
        self.slack_posts
            .lock()
            .unwrap()
            .push((webhook_url.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeadLetters {
    letters: Vec<DeadLetter>,
    down: bool,
}

impl MemoryDeadLetters {
    pub fn holding(letters: Vec<DeadLetter>) -> Self {
        Self {
            letters,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            down: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl DeadLetterReader for MemoryDeadLetters {
    async fn peek(&self, limit: usize) -> Result<Vec<DeadLetter>, DeadLetterError> {
        if self.down {
            return Err(DeadLetterError::Unavailable("broker down".into()));
        }
        Ok(self.letters.iter().take(limit).cloned().collect())
    }
}

/// A fully wired [`AppState`] over in-memory fakes.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub queue: Arc<MemoryQueue>,
    pub active: Arc<MemoryActiveStore>,
    pub logs: Arc<MemoryLogStore>,
    pub registry: Arc<MemoryRegistry>,
    pub gateway: Arc<RecordingGateway>,
    pub audit: Arc<RecordingAuditSink>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_queue(MemoryQueue::default())
    }

    pub fn with_queue(queue: MemoryQueue) -> Self {
        Self::build(queue, MemoryDeadLetters::default())
    }

    pub fn with_dead_letters(dead_letters: MemoryDeadLetters) -> Self {
        Self::build(MemoryQueue::default(), dead_letters)
    }

    fn build(queue: MemoryQueue, dead_letters: MemoryDeadLetters) -> Self {
        let queue = Arc::new(queue);
        let active = Arc::new(MemoryActiveStore::default());
        let logs = Arc::new(MemoryLogStore::default());
        let registry = Arc::new(MemoryRegistry::default());
        let gateway = Arc::new(RecordingGateway::default());
        let audit = Arc::new(RecordingAuditSink::default());

        let push = LivePushEmitter::new(registry.clone(), gateway.clone());
        let state = Arc::new(AppState {
            config: AppConfig::default(),
            dispatcher: FanOutDispatcher::new(queue.clone()),
            transitions: TransitionEngine::new(
                active.clone(),
                push.clone(),
                AuditLogger::new(audit.clone()),
            ),
            processor: DeliveryProcessor::new(
                active.clone(),
                logs.clone(),
                Arc::new(RecordingChannelSender::default()),
                push,
                Duration::days(30),
            ),
            audit_writer: AuditWriter::new(logs.clone(), Duration::days(30)),
            registry: registry.clone(),
            active: active.clone(),
            logs: logs.clone(),
            dead_letters: Arc::new(dead_letters),
            metrics_handle: None,
        });

        Self {
            state,
            queue,
            active,
            logs,
            registry,
            gateway,
            audit,
        }
    }
}
