//! Wire envelope
//!
//! JSON frames exchanged with clients. The shapes are fixed by the client
//! SDKs, so field names and `type` tags must stay exactly as they are.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::broker::message::{Delivery, Message, MessageKind, Notification, NotificationLevel};
use crate::utils::error::HubError;

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe { topic: String, message_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { topic: String, message_id: String },
    #[serde(rename_all = "camelCase")]
    Publish {
        topic: String,
        payload: Value,
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack_required: Option<bool>,
    },
    /// `timestamp` is any JSON number the client chose to send; it is not
    /// interpreted.
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Body shared by `message` and `event` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFrame {
    pub id: String,
    pub topic: String,
    pub payload: Value,
    pub timestamp: i64,
    pub from: String,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Message(MessageFrame),
    Event(MessageFrame),
    Ack {
        id: String,
        status: AckStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Notification {
        id: String,
        level: NotificationLevel,
        message: String,
        timestamp: i64,
    },
    HeartbeatAck {
        timestamp: i64,
    },
}

impl ServerMessage {
    /// Success ack; `extra` must be a JSON object and is merged into the frame.
    pub fn ack_success(id: impl Into<String>, extra: Value) -> Self {
        let extra = match extra {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ServerMessage::Ack {
            id: id.into(),
            status: AckStatus::Success,
            error: None,
            extra,
        }
    }

    /// Error ack carrying a stable `code` alongside the human-readable text.
    pub fn ack_failure(id: impl Into<String>, code: &str, error: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("code".to_string(), Value::String(code.to_string()));
        ServerMessage::Ack {
            id: id.into(),
            status: AckStatus::Error,
            error: Some(error.into()),
            extra,
        }
    }

    pub fn ack_error(id: impl Into<String>, err: &HubError) -> Self {
        Self::ack_failure(id, err.code(), err.to_string())
    }

    pub fn heartbeat_ack() -> Self {
        ServerMessage::HeartbeatAck {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl From<&Message> for MessageFrame {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            timestamp: message.timestamp,
            from: message.from.clone(),
            seq: message.seq,
        }
    }
}

impl From<&Notification> for ServerMessage {
    fn from(notification: &Notification) -> Self {
        ServerMessage::Notification {
            id: notification.id.clone(),
            level: notification.level,
            message: notification.message.clone(),
            timestamp: notification.timestamp,
        }
    }
}

impl From<&Delivery> for ServerMessage {
    fn from(delivery: &Delivery) -> Self {
        match delivery {
            Delivery::Message(message) => match message.kind {
                MessageKind::Message => ServerMessage::Message(message.into()),
                MessageKind::Event => ServerMessage::Event(message.into()),
            },
            Delivery::Notification(notification) => notification.into(),
        }
    }
}
