//! Connection registry
//!
//! Authoritative store of live connections and their topic memberships. The
//! registry is a plain data structure; the broker keeps it behind the same
//! lock as the topic directory so membership changes on both sides stay in
//! step.

pub mod connection;

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub use connection::{Connection, ConnectionId, ConnectionSnapshot};

use crate::auth::Principal;
use crate::utils::error::{HubError, Result};

#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a connection with no memberships.
    pub fn register(&mut self, id: ConnectionId, principal: Principal) -> Result<()> {
        if self.connections.contains_key(&id) {
            return Err(HubError::DuplicateConnection(id));
        }
        self.connections
            .insert(id.clone(), Connection::new(id, principal));
        Ok(())
    }

    /// Refreshes last activity. Unknown ids are ignored: a heartbeat racing a
    /// disconnect is expected.
    pub fn touch(&mut self, id: &str) {
        self.touch_at(id, Instant::now());
    }

    pub fn touch_at(&mut self, id: &str, now: Instant) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.last_activity = now;
        }
    }

    pub fn add_topic(&mut self, id: &str, topic: &str) -> Result<()> {
        let conn = self.get_mut(id)?;
        conn.topics.insert(topic.to_string());
        Ok(())
    }

    pub fn remove_topic(&mut self, id: &str, topic: &str) -> Result<()> {
        let conn = self.get_mut(id)?;
        conn.topics.remove(topic);
        Ok(())
    }

    /// Removes the connection and returns its final state, or `None` if it
    /// was already gone.
    pub fn remove(&mut self, id: &str) -> Option<ConnectionSnapshot> {
        self.connections.remove(id).map(ConnectionSnapshot::from)
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Ids of connections idle for longer than `timeout` as of `now`.
    pub fn stale(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|conn| conn.idle_for(now) > timeout)
            .map(|conn| conn.id.clone())
            .collect()
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Connection> {
        self.connections
            .get_mut(id)
            .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))
    }
}
