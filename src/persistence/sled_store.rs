//! Message archive backed by `sled`
//!
//! Each topic gets its own tree. Keys are `<timestamp>_<seq>` with both parts
//! zero-padded, so iteration yields messages in chronological order and TTL
//! pruning can read the timestamp straight from the key.
//!
//! Configuration options supported:
//! - `ttl_seconds`: messages older than this are pruned on every write and load
//! - `max_messages_per_topic`: oldest messages are removed once the cap is hit

use std::path::Path;

use chrono::Utc;
use sled::{Db, Tree};
use tracing::warn;

use crate::broker::message::Message;
use crate::persistence::MessageStore;
use crate::utils::error::StoreError;

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    ttl_seconds: Option<i64>,
    max_messages_per_topic: Option<usize>,
}

impl SledStore {
    /// Open or create a sled database at `path` with the given policy.
    pub fn open(
        path: impl AsRef<Path>,
        ttl_seconds: Option<i64>,
        max_messages_per_topic: Option<usize>,
    ) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            ttl_seconds,
            max_messages_per_topic,
        })
    }

    /// Archived messages for a topic, oldest first, after TTL pruning.
    pub fn load_messages(&self, topic: &str) -> Result<Vec<Message>, StoreError> {
        let tree = self.db.open_tree(topic)?;
        self.cleanup_old_messages(&tree);

        let mut messages = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry?;
            match serde_json::from_slice(&value) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(topic, error = %e, "skipping unreadable archived message"),
            }
        }
        Ok(messages)
    }

    fn key_for(message: &Message) -> String {
        format!("{:020}_{:020}", message.timestamp, message.seq)
    }

    fn enforce_cap(&self, tree: &Tree) -> Result<(), StoreError> {
        let Some(max) = self.max_messages_per_topic else {
            return Ok(());
        };
        let total = tree.len();
        if total <= max {
            return Ok(());
        }

        let excess: Vec<_> = tree
            .iter()
            .take(total - max)
            .filter_map(|entry| entry.ok().map(|(k, _)| k))
            .collect();
        for key in excess {
            tree.remove(key)?;
        }
        Ok(())
    }

    /// Remove messages older than the TTL from a single topic tree.
    fn cleanup_old_messages(&self, tree: &Tree) {
        let Some(ttl) = self.ttl_seconds else {
            return;
        };
        let expiry_time = Utc::now().timestamp_millis() - ttl * 1000;

        let old_keys: Vec<_> = tree
            .iter()
            .filter_map(|res| res.ok())
            .filter_map(|(key_bytes, _)| {
                let key = std::str::from_utf8(&key_bytes).ok()?;
                let (ts, _) = key.split_once('_')?;
                let ts = ts.parse::<i64>().ok()?;
                (ts < expiry_time).then_some(key_bytes)
            })
            .collect();

        for key in old_keys {
            if let Err(e) = tree.remove(key) {
                warn!(error = %e, "failed to prune expired message");
            }
        }
    }
}

impl MessageStore for SledStore {
    fn record(&self, message: &Message) -> Result<(), StoreError> {
        let tree = self.db.open_tree(&message.topic)?;
        let serialized = serde_json::to_vec(message)?;
        tree.insert(Self::key_for(message).as_bytes(), serialized)?;
        self.enforce_cap(&tree)?;
        self.cleanup_old_messages(&tree);
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_messages_per_topic", &self.max_messages_per_topic)
            .finish()
    }
}
