//! Topic directory
//!
//! Maps topic names to their subscriber sets. Topics are created on first
//! subscribe and dropped the moment their last subscriber leaves, so the map
//! never holds an empty topic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broker::topic::{DeliveryTurn, Topic};
use crate::registry::ConnectionId;
use crate::utils::error::{HubError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub created: bool,
    pub subscriber_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    pub subscriber_count: usize,
    pub topic_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicInfo {
    pub name: String,
    pub subscriber_count: usize,
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Sequence number plus the recipients that were subscribed when it was
/// assigned, and the delivery turn that keeps fan-out in sequence order.
#[derive(Debug)]
pub(crate) struct DeliveryTicket {
    pub sequence: u64,
    pub recipients: Vec<ConnectionId>,
    pub turn: DeliveryTurn,
}

#[derive(Debug, Default)]
pub struct TopicDirectory {
    topics: HashMap<String, Topic>,
}

impl TopicDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a connection, creating the topic if needed. Subscribing
    /// twice is a no-op that reports the current count.
    pub fn subscribe(&mut self, topic: &str, id: ConnectionId) -> SubscribeOutcome {
        let created = !self.topics.contains_key(topic);
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));
        entry.subscribe(id);
        SubscribeOutcome {
            created,
            subscriber_count: entry.subscribers.len(),
        }
    }

    /// Unsubscribes a connection and removes the topic once it is empty.
    /// Unknown topics and non-members are a no-op.
    pub fn unsubscribe(&mut self, topic: &str, id: &str) -> UnsubscribeOutcome {
        let Some(entry) = self.topics.get_mut(topic) else {
            return UnsubscribeOutcome {
                subscriber_count: 0,
                topic_removed: false,
            };
        };

        entry.unsubscribe(id);
        let subscriber_count = entry.subscribers.len();
        let topic_removed = entry.is_empty();
        if topic_removed {
            self.topics.remove(topic);
        }

        UnsubscribeOutcome {
            subscriber_count,
            topic_removed,
        }
    }

    /// Next sequence number for `topic`. Fails without side effects when the
    /// topic has no subscribers.
    pub fn next_sequence(&mut self, topic: &str) -> Result<u64> {
        self.topics
            .get_mut(topic)
            .map(Topic::next_sequence)
            .ok_or_else(|| HubError::TopicNotFound(topic.to_string()))
    }

    /// Point-in-time copy of the subscriber set.
    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|t| t.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn prepare_delivery(&mut self, topic: &str) -> Result<DeliveryTicket> {
        let entry = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| HubError::TopicNotFound(topic.to_string()))?;
        Ok(DeliveryTicket {
            sequence: entry.next_sequence(),
            recipients: entry.subscribers.iter().cloned().collect(),
            turn: entry.reserve_turn(),
        })
    }

    pub fn get(&self, topic: &str) -> Option<&Topic> {
        self.topics.get(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn info(&self, topic: &str) -> Option<TopicInfo> {
        self.topics.get(topic).map(|t| TopicInfo {
            name: t.name.clone(),
            subscriber_count: t.subscribers.len(),
            message_count: t.message_count(),
            created_at: t.created_at,
        })
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
