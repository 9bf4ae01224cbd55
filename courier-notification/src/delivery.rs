//! Delivery records and the builder that derives them from a notification request.
//!
//! One request names a user and a map of channel type to channel body. The
//! builder validates it and produces one [`DeliveryRecord`] per known channel,
//! all sharing a single `notification_id`. Unknown channel keys keep their slot
//! in the plan without a record so the caller can still report them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Slack,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::Slack => "slack",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_app" => Some(Self::InApp),
            "email" => Some(Self::Email),
            "slack" => Some(Self::Slack),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incoming create request. Fields are optional so that absence is reported
/// as a validation failure rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationRequest {
    pub user_id: Option<String>,
    /// Insertion order of the keys is the order of the response entries.
    pub channels: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Channel-specific content. Which fields are present depends on the channel:
/// `in_app` carries only `message`, `email` adds `subject` and
/// `receiver_email`, `slack` adds the webhook in `slack`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<String>,
}

/// One unit of per-channel work, as it travels on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: Uuid,
    pub user_id: String,
    pub channel: Channel,
    pub body: ChannelBody,
}

/// A slot in the plan, in request order. `record` is `None` for channel keys
/// this service does not know.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChannel {
    pub channel: String,
    pub record: Option<DeliveryRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPlan {
    pub notification_id: Uuid,
    pub entries: Vec<PlannedChannel>,
}

impl DeliveryPlan {
    pub fn records(&self) -> impl Iterator<Item = &DeliveryRecord> {
        self.entries.iter().filter_map(|e| e.record.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required argument: user_id")]
    MissingUserId,

    #[error("missing required argument: at least one channel must be provided")]
    MissingChannels,

    #[error("channel '{channel}' body must be an object")]
    InvalidBody { channel: String },

    #[error("channel '{channel}' body is missing required field '{field}'")]
    MissingField { channel: String, field: &'static str },
}

#[derive(Debug, Deserialize)]
struct RawChannelBody {
    message: Option<String>,
    subject: Option<String>,
    receiver_email: Option<String>,
    slack: Option<String>,
}

/// Validate a request and turn it into a delivery plan.
pub fn build(request: &NotificationRequest) -> Result<DeliveryPlan, ValidationError> {
    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingUserId)?;

    let channels = request
        .channels
        .as_ref()
        .filter(|c| !c.is_empty())
        .ok_or(ValidationError::MissingChannels)?;

    let notification_id = Uuid::new_v4();
    let mut entries = Vec::with_capacity(channels.len());

    for (key, value) in channels {
        let record = match Channel::parse(key) {
            Some(channel) => Some(DeliveryRecord {
                notification_id,
                user_id: user_id.to_string(),
                channel,
                body: normalize_body(channel, key, value)?,
            }),
            None => None,
        };

        entries.push(PlannedChannel {
            channel: key.clone(),
            record,
        });
    }

    Ok(DeliveryPlan {
        notification_id,
        entries,
    })
}

fn normalize_body(
    channel: Channel,
    key: &str,
    value: &serde_json::Value,
) -> Result<ChannelBody, ValidationError> {
    if !value.is_object() {
        return Err(ValidationError::InvalidBody {
            channel: key.to_string(),
        });
    }

    let raw: RawChannelBody = serde_json::from_value(value.clone()).map_err(|_| {
        ValidationError::InvalidBody {
            channel: key.to_string(),
        }
    })?;

    let message = raw.message.ok_or_else(|| ValidationError::MissingField {
        channel: key.to_string(),
        field: "message",
    })?;

    let body = match channel {
        Channel::InApp => ChannelBody {
            message,
            ..Default::default()
        },
        // Address and subject are passed through; the address is checked at send time.
        Channel::Email => ChannelBody {
            message,
            subject: raw.subject,
            receiver_email: raw.receiver_email,
            slack: None,
        },
        Channel::Slack => ChannelBody {
            message,
            slack: Some(raw.slack.ok_or_else(|| ValidationError::MissingField {
                channel: key.to_string(),
                field: "slack",
            })?),
            ..Default::default()
        },
    };

    Ok(body)
}
