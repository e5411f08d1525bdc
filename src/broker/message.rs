//! Message definitions for the broker
//!
//! `Message` is the immutable record created for every publish. The payload
//! is opaque: the broker only requires that it is present.
//!
//! Notes on fields:
//! - `id`: UUID generated at publish time
//! - `from`: principal id of the sender, or `system` for server events
//! - `seq`: per-topic sequence number, starting at 1
//! - `timestamp`: milliseconds since UNIX epoch, set by the broker

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Sender id used for messages the server emits on its own behalf.
pub const SYSTEM_SENDER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Published by a client.
    Message,
    /// Emitted by the server.
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub topic: String,
    pub from: String,
    pub payload: Value,
    pub seq: u64,
    pub timestamp: i64,
}

impl Message {
    pub fn new(kind: MessageKind, topic: &str, from: &str, payload: Value, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            topic: topic.to_string(),
            from: from.to_string(),
            payload,
            seq,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Out-of-band notice addressed to a connection or a topic group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub timestamp: i64,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// What the broker hands to a transport for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(Message),
    Notification(Notification),
}
